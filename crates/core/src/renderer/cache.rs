use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::backend::GpuBackend;
use super::canvas::CanvasId;
use super::flamechart_renderer::FlamechartRenderer;
use crate::flamechart::{Flamechart, ViewKind};
use crate::model::ProfileId;

/// Everything a flamechart layout depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    pub profile: ProfileId,
    pub view: ViewKind,
    pub flatten_recursion: bool,
}

/// Memoized layouts, shared by reference with the renderers drawing them.
#[derive(Debug, Default)]
pub struct LayoutCache {
    entries: FxHashMap<LayoutKey, Arc<Flamechart>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &LayoutKey) -> Option<Arc<Flamechart>> {
        self.entries.get(key).cloned()
    }

    /// The cached layout for `key`, computing it with `layout` on a miss.
    pub fn get_or_insert_with(
        &mut self,
        key: LayoutKey,
        layout: impl FnOnce() -> Flamechart,
    ) -> Arc<Flamechart> {
        Arc::clone(self.entries.entry(key).or_insert_with(|| {
            log::debug!("layout cache miss for {key:?}");
            Arc::new(layout())
        }))
    }

    /// Drop layouts of profiles that are no longer loaded.
    pub fn retain_profiles(&mut self, live: &[ProfileId]) {
        self.entries.retain(|key, _| live.contains(&key.profile));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Identity of a renderer: which canvas it draws on and which layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererKey {
    pub canvas: CanvasId,
    pub layout: LayoutKey,
}

/// A position in the UI that holds one renderer at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewSlot {
    Main,
    Callers,
    Callees,
}

struct Entry {
    key: RendererKey,
    renderer: FlamechartRenderer,
}

/// One memoized renderer per view slot.
///
/// Asking a slot for a different key releases the previous renderer's
/// backend resources before the new one is created.
#[derive(Default)]
pub struct RendererCache {
    slots: FxHashMap<ViewSlot, Entry>,
}

impl RendererCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        slot: ViewSlot,
        key: RendererKey,
        chart: impl FnOnce() -> Arc<Flamechart>,
    ) -> &mut FlamechartRenderer {
        let stale = self.slots.get(&slot).is_some_and(|entry| entry.key != key);
        if stale {
            if let Some(mut old) = self.slots.remove(&slot) {
                log::debug!("releasing renderer for {:?} in {slot:?}", old.key);
                old.renderer.release(backend);
            }
        }
        let entry = self.slots.entry(slot).or_insert_with(|| Entry {
            key,
            renderer: FlamechartRenderer::new(chart()),
        });
        &mut entry.renderer
    }

    pub fn key(&self, slot: ViewSlot) -> Option<RendererKey> {
        self.slots.get(&slot).map(|entry| entry.key)
    }

    /// Release and forget the renderer in `slot`.
    pub fn evict<B: GpuBackend + ?Sized>(&mut self, backend: &mut B, slot: ViewSlot) {
        if let Some(mut entry) = self.slots.remove(&slot) {
            entry.renderer.release(backend);
        }
    }

    /// Release every renderer.
    pub fn clear<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, mut entry) in self.slots.drain() {
            entry.renderer.release(backend);
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flamechart::LayoutMode;
    use crate::model::{FrameInfo, Profile, StackListBuilder, ValueUnit};
    use crate::renderer::backend::HeadlessBackend;
    use crate::renderer::flamechart_renderer::RenderProps;
    use crate::search::SearchIndex;
    use crate::viewport::{FlamechartViewport, ViewSizes};
    use flamescope_protocol::Vec2;

    fn profile() -> Profile {
        let mut b = StackListBuilder::new();
        let a = b.frame_id(&FrameInfo::named("a"));
        let c = b.frame_id(&FrameInfo::named("c"));
        b.append_sample(&[a, c], 2.0);
        b.append_sample(&[a], 1.0);
        b.build("p", ValueUnit::None)
    }

    fn key(profile: &Profile, view: ViewKind) -> LayoutKey {
        LayoutKey {
            profile: profile.id(),
            view,
            flatten_recursion: false,
        }
    }

    fn draw(renderer: &mut FlamechartRenderer, backend: &mut HeadlessBackend) {
        let mut vp = FlamechartViewport::new(ViewSizes::default());
        vp.set_logical_space_viewport_size(renderer.chart(), Vec2::new(300.0, 100.0), 1.0);
        let search = SearchIndex::new();
        let props = RenderProps {
            viewport: &vp,
            origin: Vec2::ZERO,
            search: &search,
            hovered: None,
            selected: None,
        };
        renderer.render(backend, &props, &mut Vec::new()).unwrap();
    }

    #[test]
    fn layouts_are_computed_once_per_key() {
        let p = profile();
        let mut cache = LayoutCache::new();
        let mut computed = 0;
        let k = key(&p, ViewKind::LeftHeavy);
        let first = cache.get_or_insert_with(k, || {
            computed += 1;
            Flamechart::layout(&p, LayoutMode::LeftHeavy)
        });
        let second = cache.get_or_insert_with(k, || {
            computed += 1;
            Flamechart::layout(&p, LayoutMode::LeftHeavy)
        });
        assert_eq!(computed, 1);
        assert!(Arc::ptr_eq(&first, &second));

        let other = key(&p, ViewKind::Chronological);
        cache.get_or_insert_with(other, || Flamechart::layout(&p, LayoutMode::Chronological));
        assert_eq!(cache.len(), 2);

        let clone = p.shallow_clone();
        cache.retain_profiles(&[clone.id()]);
        assert!(cache.is_empty());
    }

    #[test]
    fn changing_key_releases_previous_renderer() {
        let p = profile();
        let mut layouts = LayoutCache::new();
        let mut renderers = RendererCache::new();
        let mut backend = HeadlessBackend::new();

        let left_heavy = key(&p, ViewKind::LeftHeavy);
        let chart = layouts.get_or_insert_with(left_heavy, || {
            Flamechart::layout(&p, LayoutMode::LeftHeavy)
        });
        let rkey = RendererKey {
            canvas: CanvasId(1),
            layout: left_heavy,
        };
        let renderer = renderers.get_or_create(&mut backend, ViewSlot::Main, rkey, || {
            Arc::clone(&chart)
        });
        draw(renderer, &mut backend);
        assert_eq!(backend.live_batches(), 1);

        // Same key: same renderer, no new upload.
        let renderer = renderers.get_or_create(&mut backend, ViewSlot::Main, rkey, || {
            unreachable!("renderer should be cached")
        });
        draw(renderer, &mut backend);
        assert_eq!(backend.created_batches(), 1);

        let chrono = key(&p, ViewKind::Chronological);
        let chart = layouts.get_or_insert_with(chrono, || {
            Flamechart::layout(&p, LayoutMode::Chronological)
        });
        let rkey = RendererKey {
            canvas: CanvasId(1),
            layout: chrono,
        };
        let renderer =
            renderers.get_or_create(&mut backend, ViewSlot::Main, rkey, || Arc::clone(&chart));
        assert_eq!(backend.live_batches(), 0);
        draw(renderer, &mut backend);
        assert_eq!(backend.live_batches(), 1);
        assert_eq!(renderers.key(ViewSlot::Main), Some(rkey));

        renderers.clear(&mut backend);
        assert_eq!(backend.live_batches(), 0);
        assert!(renderers.is_empty());
    }

    #[test]
    fn slots_are_independent() {
        let p = profile();
        let mut renderers = RendererCache::new();
        let mut backend = HeadlessBackend::new();
        let chart = Arc::new(Flamechart::layout(&p, LayoutMode::LeftHeavy));
        for slot in [ViewSlot::Callers, ViewSlot::Callees] {
            let rkey = RendererKey {
                canvas: CanvasId(1),
                layout: key(&p, ViewKind::LeftHeavy),
            };
            let renderer =
                renderers.get_or_create(&mut backend, slot, rkey, || Arc::clone(&chart));
            draw(renderer, &mut backend);
        }
        assert_eq!(renderers.len(), 2);
        assert_eq!(backend.live_batches(), 2);
        renderers.evict(&mut backend, ViewSlot::Callers);
        assert_eq!(backend.live_batches(), 1);
    }
}
