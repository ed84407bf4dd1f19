//! Frame orchestration: the callback installed into the core while a frame
//! is composited, and the timing correction applied afterwards.

use super::LAYER_ID;
use super::state::LayerContext;
use crate::core::{Compositor, DrawCallback, Image, RenderRequest, Timing};
use crate::gpu::Gpu;
use log::{trace, warn};
use std::cell::RefCell;
use std::rc::Rc;

/// Core draw callback slot holding the layer's adapter. Dropping it puts the
/// previous callback back, on every exit path.
pub(super) struct InstalledCallback<'a> {
    core: &'a mut dyn Compositor,
    previous: Option<DrawCallback>,
}

impl<'a> InstalledCallback<'a> {
    pub(super) fn install(core: &'a mut dyn Compositor, callback: DrawCallback) -> Self {
        let previous = core.draw_callback();
        core.set_draw_callback(Some(callback));
        Self { core, previous }
    }

    pub(super) fn core(&mut self) -> &mut dyn Compositor {
        &mut *self.core
    }
}

impl Drop for InstalledCallback<'_> {
    fn drop(&mut self) {
        self.core.set_draw_callback(self.previous.take());
    }
}

/// Callback the core runs once per local render.
///
/// Binds the primary framebuffer, applies the core's background as the clear
/// color and runs the user callback. With a device compressor it then copies
/// depth into the float target.
pub(super) fn render_adapter<G: Gpu + 'static>(ctx: Rc<RefCell<LayerContext<G>>>) -> DrawCallback {
    Rc::new(move |request: &RenderRequest<'_>, _image: &mut Image| {
        let (gpu, targets, mut callback) = {
            let mut ctx = ctx.borrow_mut();
            let Some(targets) = ctx.render_targets() else {
                warn!("render callback invoked without render targets");
                return;
            };
            (ctx.gpu.clone(), targets, ctx.draw_callback.take())
        };

        gpu.bind_framebuffer(Some(targets.framebuffer));
        gpu.set_clear_color(request.background);
        if let Some(callback) = callback.as_mut() {
            trace!("{}: calling draw callback for {:?}", LAYER_ID, request.viewport);
            callback(request, targets);
        }

        let mut ctx = ctx.borrow_mut();
        if ctx.draw_callback.is_none() {
            ctx.draw_callback = callback;
        }
        if let (Some(fb), Some(program), Some(quad)) = (ctx.compression_framebuffer, ctx.program, ctx.quad) {
            let (width, height) = ctx.physical;
            trace!("depth copy pass {}x{}", width, height);
            gpu.bind_framebuffer(Some(fb));
            gpu.draw_quad(program, quad, targets.depth_texture, width, height);
        }
        gpu.bind_framebuffer(None);
    })
}

/// Attribute untimed frame time to compositing so that
/// `render + buffer_read + buffer_write + composite == total`
pub fn correct_render_times(timing: &mut Timing, total: f64) {
    timing.total_draw = total;
    timing.composite = total - timing.render - timing.buffer_read - timing.buffer_write;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LocalCompositor, LocalCompositorConfig};
    use proptest::prelude::*;

    #[test]
    fn test_installed_callback_restored_on_drop() {
        let mut core = LocalCompositor::new(LocalCompositorConfig::default());
        let original: DrawCallback = Rc::new(|_: &RenderRequest<'_>, _: &mut Image| {});
        core.set_draw_callback(Some(original.clone()));

        {
            let replacement: DrawCallback = Rc::new(|_: &RenderRequest<'_>, _: &mut Image| {});
            let mut installed = InstalledCallback::install(&mut core, replacement.clone());
            let current = installed.core().draw_callback().unwrap();
            assert!(Rc::ptr_eq(&current, &replacement));
        }

        assert!(Rc::ptr_eq(&core.draw_callback().unwrap(), &original));
    }

    #[test]
    fn test_correction_example() {
        let mut timing = Timing::new();
        timing.render = 0.5;
        timing.buffer_read = 0.25;
        timing.buffer_write = 0.125;
        correct_render_times(&mut timing, 1.0);
        assert_eq!(timing.composite, 0.125);
        assert_eq!(timing.total_draw, 1.0);
    }

    proptest! {
        #[test]
        fn prop_timing_closure(
            render in 0u32..1024,
            read in 0u32..1024,
            write in 0u32..1024,
            slack in 0u32..1024,
        ) {
            // multiples of 1/1024 keep every sum exact
            let unit = 1.0 / 1024.0;
            let mut timing = Timing::new();
            timing.render = render as f64 * unit;
            timing.buffer_read = read as f64 * unit;
            timing.buffer_write = write as f64 * unit;
            let total = (render + read + write + slack) as f64 * unit;
            correct_render_times(&mut timing, total);
            prop_assert_eq!(
                timing.render + timing.buffer_read + timing.buffer_write + timing.composite,
                total
            );
            prop_assert!(timing.composite >= 0.0);
        }
    }
}
