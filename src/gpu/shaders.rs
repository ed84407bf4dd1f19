//! Depth-copy pass shaders and geometry.
//!
//! Hardware depth textures cannot be read by every compression backend, so
//! after each local render the depth attachment is sampled and written into
//! an `R32F` color target of the same size.

/// Full-screen quad as a 4-vertex triangle strip (2 triangles), NDC x/y pairs
#[rustfmt::skip]
pub const UNIT_QUAD: [f32; 8] = [
    -1.0, -1.0,
     1.0, -1.0,
    -1.0,  1.0,
     1.0,  1.0,
];

pub const DEPTH_COPY_VERTEX: &str = r#"#version 330 core
layout(location = 0) in vec2 a_pos;
out vec2 v_uv;

void main() {
    v_uv = a_pos * 0.5 + 0.5;
    gl_Position = vec4(a_pos, 0.0, 1.0);
}
"#;

pub const DEPTH_COPY_FRAGMENT: &str = r#"#version 330 core
uniform sampler2D u_depth;
in vec2 v_uv;
layout(location = 0) out float frag_depth;

void main() {
    frag_depth = texture(u_depth, v_uv).r;
}
"#;

/// Sampler uniform bound to texture unit 0
pub const DEPTH_SAMPLER_UNIFORM: &str = "u_depth";
