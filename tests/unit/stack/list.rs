use super::*;
use crate::foundation::core::CompositeKey;
use crate::render::composite::over;

const CANVAS: Canvas = Canvas {
    width: 3,
    height: 2,
};

fn solid(r: u8, g: u8, b: u8, a: u8) -> RgbaImage {
    RgbaImage::from_pixel(CANVAS.width, CANVAS.height, image::Rgba([r, g, b, a]))
}

fn key(raw: &[usize]) -> CompositeKey {
    CompositeKey::from_raw(raw.iter().copied()).unwrap()
}

/// Each pixel fully opaque or fully clear, varying per layer.
fn holes(i: u8) -> RgbaImage {
    RgbaImage::from_fn(CANVAS.width, CANVAS.height, |x, y| {
        let on = (x + 2 * y + u32::from(i)) % 3 != 0;
        image::Rgba([i * 40, 255 - i * 30, i * 7 + x as u8, if on { 255 } else { 0 }])
    })
}

fn stack_of(n: u8) -> LayerStack {
    let mut stack = LayerStack::new(CANVAS, EngineOpts::default());
    for i in 0..n {
        stack.add_layer(holes(i), false).unwrap();
    }
    stack
}

/// Bottom-to-top fold. Matches any blend order for the opaque-or-clear layers above.
fn reference(stack: &LayerStack) -> RgbaImage {
    let mut acc: Option<RgbaImage> = None;
    for layer in stack.layers().iter().filter(|l| l.is_visible()) {
        acc = Some(match acc {
            None => layer.image().as_ref().clone(),
            Some(bottom) => over_images(&bottom, layer.image(), false).unwrap(),
        });
    }
    acc.unwrap_or_else(|| CANVAS.blank())
}

fn cached_keys(stack: &LayerStack) -> Vec<CompositeKey> {
    stack.cache().keys().cloned().collect()
}

#[test]
fn first_layer_becomes_active() {
    let mut stack = LayerStack::new(CANVAS, EngineOpts::default());
    assert!(stack.active_index().is_none());
    let id = stack.add_layer(solid(1, 2, 3, 255), false).unwrap();
    assert_eq!(stack.active_index(), Some(LayerIndex(0)));
    stack.add_layer(solid(1, 2, 3, 255), false).unwrap();
    assert_eq!(stack.active_layer().unwrap().id(), id);
    stack.add_layer(solid(1, 2, 3, 255), true).unwrap();
    assert_eq!(stack.active_index(), Some(LayerIndex(2)));
}

#[test]
fn add_layer_rejects_wrong_size() {
    let mut stack = LayerStack::new(CANVAS, EngineOpts::default());
    assert!(stack.add_layer(RgbaImage::new(1, 1), false).is_err());
    assert!(stack.is_empty());
}

#[test]
fn from_image_adds_opaque_alpha() {
    let rgb = image::RgbImage::from_pixel(2, 2, image::Rgb([9, 8, 7]));
    let mut stack = LayerStack::from_image(DynamicImage::ImageRgb8(rgb), EngineOpts::default());
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.canvas(), Canvas { width: 2, height: 2 });
    let img = stack.render().unwrap();
    assert_eq!(img.get_pixel(1, 1).0, [9, 8, 7, 255]);
}

#[test]
fn render_matches_reference_and_is_cached() {
    let mut stack = stack_of(4);
    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
    assert!(stack.cache().contains_key(&key(&[0, 1, 2, 3])));

    let (_, stats) = stack.render_with_stats().unwrap();
    assert_eq!(stats.blends, 0);
}

#[test]
fn partial_alpha_render_joins_pairs() {
    let mut stack = LayerStack::new(CANVAS, EngineOpts::default());
    let px = [[10, 200, 30, 128], [250, 100, 0, 64], [200, 150, 100, 199], [1, 2, 3, 90]];
    for [r, g, b, a] in px {
        stack.add_layer(solid(r, g, b, a), false).unwrap();
    }
    let img = stack.render().unwrap();
    let joined = over(over(px[0], px[1]), over(px[2], px[3]));
    assert!(img.pixels().all(|p| p.0 == joined));
}

#[test]
fn nothing_visible_renders_transparent_canvas() {
    let mut stack = stack_of(2);
    stack.set_layer_visibility(LayerIndex(0), false).unwrap();
    assert!(!stack.toggle_visibility(LayerIndex(1)).unwrap());
    let img = stack.render().unwrap();
    assert_eq!(*img, CANVAS.blank());
}

#[test]
fn visibility_changes_reuse_existing_composites() {
    let mut stack = stack_of(5);
    stack.render().unwrap();

    stack.set_layer_visibility(LayerIndex(4), false).unwrap();
    assert_eq!(
        stack.visible_indices(),
        vec![LayerIndex(0), LayerIndex(1), LayerIndex(2), LayerIndex(3)]
    );
    // Cached (0, 1) and (2, 3) are reused; only their join is blended.
    let (img, stats) = stack.render_with_stats().unwrap();
    assert_eq!(*img, reference(&stack));
    assert_eq!(stats.reused, 2);
    assert_eq!(stats.blends, 1);

    assert!(stack.toggle_visibility(LayerIndex(4)).unwrap());
    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
}

#[test]
fn replacing_content_invalidates_dependent_composites() {
    let mut stack = stack_of(4);
    stack.render().unwrap();
    assert!(stack.cache().entries_containing(LayerIndex(2)).count() > 0);

    stack
        .replace_layer_image(LayerIndex(2), holes(6))
        .unwrap();
    assert_eq!(stack.cache().entries_containing(LayerIndex(2)).count(), 0);
    assert!(stack.cache().contains_key(&key(&[0, 1])));

    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
}

#[test]
fn insert_shifts_cached_keys_and_activates_new_layer() {
    let mut stack = stack_of(4);
    stack.render().unwrap();
    assert_eq!(
        cached_keys(&stack),
        vec![key(&[0, 1]), key(&[0, 1, 2, 3]), key(&[2, 3])]
    );

    let id = stack.insert_empty_layer(LayerIndex(1), true).unwrap();
    assert_eq!(stack.index_of(id), Some(LayerIndex(2)));
    assert_eq!(stack.active_index(), Some(LayerIndex(2)));
    assert_eq!(
        cached_keys(&stack),
        vec![key(&[0, 1]), key(&[0, 1, 3, 4]), key(&[3, 4])]
    );

    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
}

#[test]
fn insert_below_bottom_layer() {
    let mut stack = stack_of(2);
    let id = stack.insert_empty_layer(LayerIndex(0), false).unwrap();
    assert_eq!(stack.index_of(id), Some(LayerIndex(0)));
    assert_eq!(stack.len(), 3);
    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
}

#[test]
fn delete_drops_and_shifts_cached_keys() {
    let mut stack = stack_of(4);
    stack.render().unwrap();

    let removed = stack.delete_layer(LayerIndex(1)).unwrap();
    assert_eq!(removed.id(), LayerId(1));
    assert_eq!(cached_keys(&stack), vec![key(&[1, 2])]);

    let img = stack.render().unwrap();
    assert_eq!(*img, reference(&stack));
}

#[test]
fn delete_active_layer_moves_activity_down() {
    let mut stack = stack_of(3);
    stack.set_active_layer(LayerIndex(2)).unwrap();
    stack.delete_layer(LayerIndex(2)).unwrap();
    assert_eq!(stack.active_index(), Some(LayerIndex(1)));
}

#[test]
fn delete_active_bottom_layer_activates_top() {
    let mut stack = stack_of(3);
    stack.set_active_layer(LayerIndex(0)).unwrap();
    stack.delete_layer(LayerIndex(0)).unwrap();
    assert_eq!(stack.active_index(), Some(LayerIndex(1)));
}

#[test]
fn delete_below_active_keeps_same_layer_active() {
    let mut stack = stack_of(3);
    stack.set_active_layer(LayerIndex(2)).unwrap();
    let id = stack.active_layer().unwrap().id();
    stack.delete_layer(LayerIndex(0)).unwrap();
    assert_eq!(stack.active_layer().unwrap().id(), id);
}

#[test]
fn delete_last_layer_clears_activity() {
    let mut stack = stack_of(1);
    stack.delete_layer(LayerIndex(0)).unwrap();
    assert!(stack.active_index().is_none());
    assert!(stack.delete_layer(LayerIndex(0)).is_err());
}

#[test]
fn move_to_top_reorders_and_remaps() {
    let mut stack = stack_of(4);
    stack.set_active_layer(LayerIndex(1)).unwrap();
    let moved = stack.layer(LayerIndex(1)).unwrap().id();
    stack.render().unwrap();

    stack.move_layer_to_top(LayerIndex(1)).unwrap();
    assert_eq!(stack.index_of(moved), Some(LayerIndex(3)));
    assert_eq!(stack.active_index(), Some(LayerIndex(3)));
    // (2, 3) was built from layers now at (1, 2); everything containing 1 is gone.
    assert_eq!(cached_keys(&stack), vec![key(&[1, 2])]);

    let (img, stats) = stack.render_with_stats().unwrap();
    assert_eq!(*img, reference(&stack));
    assert_eq!(stats.reused, 1);
}

#[test]
fn move_top_layer_to_top_is_noop() {
    let mut stack = stack_of(3);
    stack.render().unwrap();
    let before = cached_keys(&stack);
    stack.move_layer_to_top(LayerIndex(2)).unwrap();
    assert_eq!(cached_keys(&stack), before);
}

#[test]
fn delete_all_layers_resets_everything() {
    let mut stack = stack_of(3);
    stack.render().unwrap();
    stack.delete_all_layers();
    assert!(stack.is_empty());
    assert!(stack.active_index().is_none());
    assert!(stack.cache().is_empty());
}

#[test]
fn preview_is_drawn_over_but_not_cached() {
    let mut stack = stack_of(2);
    let base = stack.render().unwrap();
    let keys_before = cached_keys(&stack);

    let preview = solid(255, 0, 0, 255);
    let shown = stack.render_with_preview(&preview).unwrap();
    assert_eq!(shown, preview);
    assert_eq!(cached_keys(&stack), keys_before);

    let transparent = CANVAS.blank();
    assert_eq!(stack.render_with_preview(&transparent).unwrap(), *base);
}

#[test]
fn out_of_range_indices_are_rejected() {
    let mut stack = stack_of(2);
    assert!(stack.set_active_layer(LayerIndex(2)).is_err());
    assert!(stack.set_layer_visibility(LayerIndex(5), false).is_err());
    assert!(stack.insert_empty_layer(LayerIndex(2), true).is_err());
    assert!(stack.move_layer_to_top(LayerIndex(9)).is_err());
}

#[test]
fn stack_is_a_layer_source() {
    let stack = stack_of(2);
    let img = stack.layer_image(LayerIndex(1)).unwrap();
    assert!(Arc::ptr_eq(&img, stack.layers()[1].image()));
    assert!(stack.layer_image(LayerIndex(2)).is_none());
}
