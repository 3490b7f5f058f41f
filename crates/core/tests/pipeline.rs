//! Integration test: drive a session from import to submitted draw passes on
//! a headless canvas, the way the UI does once per frame.

use flamescope_core::flamechart::ViewKind;
use flamescope_core::model::{Session, ViewMode};
use flamescope_core::renderer::{
    CanvasContext, CanvasId, HeadlessBackend, RenderError, RendererCache, RendererKey,
    RenderProps, ViewSlot,
};
use flamescope_core::viewport::{FlamechartViewport, ViewSizes};
use flamescope_protocol::{PassLayer, Rect, RenderCommand, Vec2};

const CANVAS: CanvasId = CanvasId(7);

fn import(session: &mut Session) {
    session.start_import(
        "recursive.speedscope.json",
        include_bytes!("fixtures/recursive.speedscope.json").to_vec(),
    );
    while session.is_loading() {
        session.poll_import();
    }
}

/// Render every pane of the session's current view mode, plus a minimap of
/// the first pane, as one frame.
fn draw_frame(
    session: &mut Session,
    canvas: &mut CanvasContext<HeadlessBackend>,
    renderers: &mut RendererCache,
) -> Result<bool, RenderError> {
    let views = session.views().unwrap();
    let size = canvas.logical_size();
    let pane_height = size.y / views.len() as f64;
    let mut panes = Vec::new();
    for (i, (slot, view)) in views.into_iter().enumerate() {
        let chart = session.flamechart_for(view).unwrap();
        let key = RendererKey {
            canvas: CANVAS,
            layout: session.layout_key(view).unwrap(),
        };
        let search = session.search_for(view).unwrap().clone();
        let mut viewport = FlamechartViewport::new(ViewSizes::default());
        viewport.set_inverted(view.is_inverted());
        viewport.set_logical_space_viewport_size(
            &chart,
            Vec2::new(size.x, pane_height),
            canvas.device_pixel_ratio(),
        );
        viewport.reset(&chart);
        let origin = Vec2::new(0.0, i as f64 * pane_height * canvas.device_pixel_ratio());
        let hovered = session.hovered_node(view);
        let selected = session.selected_node(view);
        panes.push((slot, key, chart, search, viewport, origin, hovered, selected));
    }

    canvas.request_frame();
    canvas.on_animation_frame(|backend, passes| {
        for (i, (slot, key, chart, search, viewport, origin, hovered, selected)) in
            panes.iter().enumerate()
        {
            let renderer = renderers.get_or_create(backend, *slot, *key, || chart.clone());
            let props = RenderProps {
                viewport,
                origin: *origin,
                search,
                hovered: *hovered,
                selected: *selected,
            };
            renderer.render(backend, &props, passes)?;
            if i == 0 {
                let area = Rect::from_xywh(0.0, 0.0, 200.0, 40.0);
                renderer.render_minimap(backend, area, viewport, passes)?;
            }
        }
        Ok(())
    })
}

#[test]
fn frame_submission_is_ordered_and_cached() {
    let mut session = Session::new();
    import(&mut session);
    assert_eq!(session.active_index(), 1);
    session.set_view_mode(ViewMode::LeftHeavy);

    let mut canvas = CanvasContext::new(CANVAS, HeadlessBackend::new());
    canvas.resize(Vec2::new(800.0, 300.0), 2.0);
    let mut renderers = RendererCache::new();

    assert!(draw_frame(&mut session, &mut canvas, &mut renderers).unwrap());
    let layers: Vec<PassLayer> = canvas.backend().submissions()[0]
        .iter()
        .map(|p| p.layer)
        .collect();
    assert_eq!(
        layers,
        vec![PassLayer::Minimap, PassLayer::Main, PassLayer::Overlay]
    );
    assert_eq!(canvas.backend().created_batches(), 1);

    // Nothing changed: the batch is reused.
    draw_frame(&mut session, &mut canvas, &mut renderers).unwrap();
    assert_eq!(canvas.backend().created_batches(), 1);
    assert_eq!(canvas.submitted_frames(), 2);
}

#[test]
fn sandwich_panes_get_their_own_renderers() {
    let mut session = Session::new();
    import(&mut session);
    session.set_active_index(0);
    session.set_view_mode(ViewMode::LeftHeavy);

    let mut canvas = CanvasContext::new(CANVAS, HeadlessBackend::new());
    canvas.resize(Vec2::new(800.0, 400.0), 1.0);
    let mut renderers = RendererCache::new();
    draw_frame(&mut session, &mut canvas, &mut renderers).unwrap();

    let chart = session.flamechart_for(ViewKind::LeftHeavy).unwrap();
    let eval = chart
        .layers()
        .iter()
        .flatten()
        .find(|f| chart.frame(f.frame).name == "eval")
        .cloned()
        .unwrap();
    session.select(ViewKind::LeftHeavy, Some(&eval));
    session.set_view_mode(ViewMode::Sandwich);
    draw_frame(&mut session, &mut canvas, &mut renderers).unwrap();
    assert_eq!(renderers.len(), 3);
    // main top-down, callers bottom-up plus its minimap, callees top-down
    assert_eq!(canvas.backend().live_batches(), 4);

    let callers = session.flamechart_for(ViewKind::Callers(eval.frame)).unwrap();
    assert_eq!(callers.total_weight(), 50.0);

    // A new layout key for the sandwich slots releases their old batches.
    session.toggle_flatten_recursion();
    draw_frame(&mut session, &mut canvas, &mut renderers).unwrap();
    assert_eq!(canvas.backend().live_batches(), 4);
    assert_eq!(canvas.backend().created_batches(), 7);

    let submitted = canvas.backend().submissions().last().unwrap();
    let batches = submitted
        .iter()
        .flat_map(|p| &p.commands)
        .filter(|c| matches!(c, RenderCommand::DrawBatch { .. }))
        .count();
    // callers, callees, and the minimap of the callers pane
    assert_eq!(batches, 3);
}

#[test]
fn failed_allocation_drops_the_frame() {
    let mut session = Session::new();
    import(&mut session);
    let mut canvas = CanvasContext::new(CANVAS, HeadlessBackend::new());
    canvas.resize(Vec2::new(400.0, 200.0), 1.0);
    canvas.backend_mut().fail_allocations = true;
    let mut renderers = RendererCache::new();

    let result = draw_frame(&mut session, &mut canvas, &mut renderers);
    assert!(matches!(result, Err(RenderError::Allocation { .. })));
    assert!(!canvas.needs_frame());
    assert!(canvas.backend().submissions().is_empty());
}
