//! Layer/compare state controller.
//!
//! [`VoxelViewer`] owns the layer list, the compare-mode settings and the
//! per-layer voxel cache, decides when voxel regeneration is required, and
//! derives difference-colored renderable output from two generated voxel
//! sets. All state mutation is expected to occur on one control flow at a
//! time; concurrent external callers must serialize access themselves.

use crate::core::constants::{DEFAULT_RESOLUTION_OFFSET, MAX_RESOLUTION_Z, MIN_RESOLUTION_Z};
use crate::core::geo::LatLngBounds;
use crate::core::layer::{ColorMode, LayerConfig, LayerUpdate};
use crate::prelude::HashMap;
use crate::spatial::index::VoxelBounds;
use crate::voxel::compare::{build_base_f_map, diff_color, elevation_color, NO_BASE_COLOR};
use crate::voxel::generator::{DemSource, VoxelGenerator};
use serde::Serialize;

/// Snapshot of the controller state delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerCoreState {
    pub layers: Vec<LayerConfig>,
    pub is_compare_mode: bool,
    pub base_layer_id: String,
    pub target_layer_id: String,
    pub resolution_offset: i32,
    pub current_z: u8,
}

/// Callback receiving state snapshots.
pub type ViewerCallback = Box<dyn Fn(&ViewerCoreState) + Send + Sync>;

/// Handle returned by [`VoxelViewer::subscribe`]; pass it back to
/// [`VoxelViewer::unsubscribe`] to stop receiving snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// One voxel with its resolved display color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyledVoxel {
    pub bounds: VoxelBounds,
    pub color: [u8; 3],
}

/// Renderable output for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderLayer {
    pub id: String,
    pub opacity: f64,
    pub voxels: Vec<StyledVoxel>,
}

/// Reactive view-model over elevation layers with a before/after compare
/// mode. See the crate docs for the regeneration policy.
pub struct VoxelViewer {
    layers: Vec<LayerConfig>,
    /// Per-layer voxel cache, replaced wholesale on every regeneration.
    layer_voxels: HashMap<String, Vec<VoxelBounds>>,

    is_compare_mode: bool,
    base_layer_id: String,
    target_layer_id: String,

    resolution_offset: i32,
    current_z: u8,

    // Last generation inputs, kept so visibility toggles can refetch.
    last_bounds: Option<LatLngBounds>,
    last_zoom: Option<f64>,

    // Observer registry in registration order.
    listeners: Vec<(u64, ViewerCallback)>,
    next_subscription: u64,

    generator: VoxelGenerator,
}

impl VoxelViewer {
    pub fn new(generator: VoxelGenerator, initial_layers: Vec<LayerConfig>) -> Self {
        let base_layer_id = initial_layers.first().map(|l| l.id.clone()).unwrap_or_default();
        let target_layer_id = initial_layers
            .get(1)
            .or_else(|| initial_layers.first())
            .map(|l| l.id.clone())
            .unwrap_or_default();

        Self {
            layers: initial_layers,
            layer_voxels: HashMap::default(),
            is_compare_mode: false,
            base_layer_id,
            target_layer_id,
            resolution_offset: DEFAULT_RESOLUTION_OFFSET,
            current_z: MIN_RESOLUTION_Z,
            last_bounds: None,
            last_zoom: None,
            listeners: Vec::new(),
            next_subscription: 0,
            generator,
        }
    }

    /// Registers a state listener. The callback is invoked once immediately
    /// with the current state, then on every state-affecting transition.
    pub fn subscribe(
        &mut self,
        callback: impl Fn(&ViewerCoreState) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_subscription;
        self.next_subscription += 1;
        let callback: ViewerCallback = Box::new(callback);
        callback(&self.state());
        self.listeners.push((id, callback));
        Subscription(id)
    }

    /// Removes a listener. Unknown handles are ignored.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.listeners.retain(|(id, _)| *id != subscription.0);
    }

    /// Current state snapshot.
    pub fn state(&self) -> ViewerCoreState {
        ViewerCoreState {
            layers: self.layers.clone(),
            is_compare_mode: self.is_compare_mode,
            base_layer_id: self.base_layer_id.clone(),
            target_layer_id: self.target_layer_id.clone(),
            resolution_offset: self.resolution_offset,
            current_z: self.current_z,
        }
    }

    /// The most recently generated voxels per layer id.
    pub fn layer_voxels(&self) -> &HashMap<String, Vec<VoxelBounds>> {
        &self.layer_voxels
    }

    fn emit(&self) {
        let state = self.state();
        for (_, callback) in &self.listeners {
            callback(&state);
        }
    }

    // --- State updaters ---

    /// Appends a layer. Regenerates when the layer is visible and bounds
    /// from a previous generation are known.
    pub async fn add_layer(&mut self, layer: LayerConfig) {
        let visible = layer.visible;
        self.layers.push(layer);
        self.emit();

        if visible {
            self.regenerate_if_bounds().await;
        }
    }

    /// Merges a partial update into the layer. Regenerates when the layer
    /// was just made visible, or when its source URL, aggregation mode or
    /// raster convention changed while visible; in the latter case the
    /// layer's cached voxels are dropped first so regeneration cannot reuse
    /// stale geometry. Unknown ids are ignored.
    pub async fn update_layer(&mut self, id: &str, update: LayerUpdate) {
        let Some(old) = self.layers.iter().find(|l| l.id == id).cloned() else {
            return;
        };
        for layer in &mut self.layers {
            if layer.id == id {
                update.apply(layer);
            }
        }
        self.emit();

        if self.last_bounds.is_none() || self.last_zoom.is_none() {
            return;
        }

        let newly_visible = update.visible == Some(true) && !old.visible;
        let url_changed = update
            .source_url
            .as_deref()
            .is_some_and(|u| u != old.source_url);
        let agg_changed = update
            .elevation_aggregation
            .is_some_and(|a| a != old.elevation_aggregation);
        let format_changed = update.dem_format.is_some_and(|f| f != old.dem_format);
        let currently_visible = self
            .layers
            .iter()
            .find(|l| l.id == id)
            .is_some_and(|l| l.visible);

        if newly_visible || ((url_changed || agg_changed || format_changed) && currently_visible) {
            if url_changed || agg_changed || format_changed {
                // Stale geometry must not survive a source change. A plain
                // visibility toggle keeps the entry.
                self.layer_voxels.remove(id);
            }
            self.regenerate_if_bounds().await;
        }
    }

    /// Deletes a layer and its cache entry. Nothing to recompute.
    pub fn remove_layer(&mut self, id: &str) {
        self.layers.retain(|l| l.id != id);
        self.layer_voxels.remove(id);
        self.emit();
    }

    /// Moves a layer within the list. Ordering affects rendering and compare
    /// precedence only, so no regeneration. Out-of-range indices are
    /// silently ignored, without notification.
    pub fn reorder_layer(&mut self, from: usize, to: usize) {
        if from >= self.layers.len() || to >= self.layers.len() {
            return;
        }
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        self.emit();
    }

    /// Toggles compare mode. Turning it on regenerates so the base layer's
    /// voxels exist even if it was previously invisible.
    pub async fn set_compare_mode(&mut self, enabled: bool) {
        if self.is_compare_mode == enabled {
            return;
        }
        self.is_compare_mode = enabled;
        self.emit();
        if enabled {
            self.regenerate_if_bounds().await;
        }
    }

    pub async fn set_base_layer_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.base_layer_id == id {
            return;
        }
        self.base_layer_id = id;
        self.emit();
        if self.is_compare_mode {
            self.regenerate_if_bounds().await;
        }
    }

    pub async fn set_target_layer_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.target_layer_id == id {
            return;
        }
        self.target_layer_id = id;
        self.emit();
        if self.is_compare_mode {
            self.regenerate_if_bounds().await;
        }
    }

    /// Changes the resolution delta. A resolution change invalidates all
    /// cached geometry, so this always regenerates when bounds are known.
    pub async fn set_resolution_offset(&mut self, offset: i32) {
        if self.resolution_offset == offset {
            return;
        }
        self.resolution_offset = offset;
        self.emit();
        self.regenerate_if_bounds().await;
    }

    async fn regenerate_if_bounds(&mut self) {
        if let (Some(bounds), Some(zoom)) = (self.last_bounds.clone(), self.last_zoom) {
            self.generate_voxels(&bounds, zoom).await;
        }
    }

    // --- Core logic ---

    /// Regenerates voxels for every layer that is visible, or that is the
    /// designated base layer while compare mode is active, concurrently
    /// across layers. The per-layer cache is replaced wholesale with the new
    /// results; entries for layers not regenerated this round are dropped.
    pub async fn generate_voxels(&mut self, bounds: &LatLngBounds, viewport_zoom: f64) {
        self.last_bounds = Some(bounds.clone());
        self.last_zoom = Some(viewport_zoom);

        let target_z = (viewport_zoom.floor() as i32 + self.resolution_offset)
            .clamp(MIN_RESOLUTION_Z as i32, MAX_RESOLUTION_Z as i32) as u8;
        self.current_z = target_z;

        log::info!("generating voxels for zoom {viewport_zoom:.2} -> z{target_z}");

        let jobs: Vec<(String, DemSource)> = self
            .layers
            .iter()
            .filter(|l| l.visible || (self.is_compare_mode && l.id == self.base_layer_id))
            .map(|l| (l.id.clone(), DemSource::from(l)))
            .collect();

        let generator = &self.generator;
        let results = futures::future::join_all(jobs.into_iter().map(|(id, source)| async move {
            let voxels = generator
                .generate(bounds, target_z, viewport_zoom, &source)
                .await;
            (id, voxels)
        }))
        .await;

        let mut fresh: HashMap<String, Vec<VoxelBounds>> = HashMap::default();
        for (id, voxels) in results {
            fresh.insert(id, voxels);
        }
        self.layer_voxels = fresh;
        self.emit();
    }

    /// Composes the renderable output for all layers.
    ///
    /// In compare mode only the target layer is emitted, colored by its
    /// per-column vertical-index difference against the base layer's highest
    /// surface cell; everything else is suppressed so the diff map stands
    /// alone. Otherwise each visible layer is emitted with its solid color
    /// or the elevation gradient.
    pub fn render_layers(&self) -> Vec<RenderLayer> {
        let base_f_map = if self.is_compare_mode {
            self.layer_voxels
                .get(&self.base_layer_id)
                .map(|v| build_base_f_map(v))
        } else {
            None
        };

        self.layers
            .iter()
            .filter_map(|layer| {
                if !layer.visible {
                    return None;
                }
                let voxels = self.layer_voxels.get(&layer.id)?;

                if self.is_compare_mode {
                    if layer.id != self.target_layer_id {
                        return None;
                    }
                    let base_f_map = base_f_map.as_ref()?;
                    let styled = voxels
                        .iter()
                        .map(|v| {
                            let color = match base_f_map.get(&v.id.column_key()) {
                                None => NO_BASE_COLOR,
                                Some(&base_f) => diff_color(v.id.f - base_f),
                            };
                            StyledVoxel { bounds: *v, color }
                        })
                        .collect();
                    Some(RenderLayer {
                        id: layer.id.clone(),
                        opacity: 0.9,
                        voxels: styled,
                    })
                } else {
                    let styled = voxels
                        .iter()
                        .map(|v| {
                            let color = match layer.color_mode {
                                ColorMode::Solid => layer.color,
                                ColorMode::ElevationGradient => elevation_color(v.center.alt),
                            };
                            StyledVoxel { bounds: *v, color }
                        })
                        .collect();
                    Some(RenderLayer {
                        id: layer.id.clone(),
                        opacity: layer.opacity,
                        voxels: styled,
                    })
                }
            })
            .collect()
    }

    /// Vertical-index difference of `voxel` against the base layer's cell in
    /// the same column, when compare mode is active and the column exists in
    /// the base set.
    pub fn column_diff(&self, voxel: &VoxelBounds) -> Option<i32> {
        if !self.is_compare_mode {
            return None;
        }
        let base = self.layer_voxels.get(&self.base_layer_id)?;
        let base_voxel = base.iter().find(|v| {
            v.id.z == voxel.id.z && v.id.x == voxel.id.x && v.id.y == voxel.id.y
        })?;
        Some(voxel.id.f - base_voxel.id.f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn layer(id: &str) -> LayerConfig {
        LayerConfig::new(id, id.to_uppercase(), "mock://{z}/{x}/{y}")
    }

    fn viewer(layers: Vec<LayerConfig>) -> VoxelViewer {
        VoxelViewer::new(VoxelGenerator::with_http(), layers)
    }

    #[test]
    fn test_initial_base_and_target_ids() {
        let v = viewer(vec![layer("a"), layer("b")]);
        let state = v.state();
        assert_eq!(state.base_layer_id, "a");
        assert_eq!(state.target_layer_id, "b");
        assert_eq!(state.resolution_offset, DEFAULT_RESOLUTION_OFFSET);
        assert_eq!(state.current_z, MIN_RESOLUTION_Z);

        let single = viewer(vec![layer("only")]);
        assert_eq!(single.state().target_layer_id, "only");
    }

    #[test]
    fn test_subscribe_immediate_call_and_unsubscribe() {
        let mut v = viewer(vec![layer("a")]);
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let sub = v.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        v.remove_layer("a");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        v.unsubscribe(sub);
        v.reorder_layer(0, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reorder_out_of_range_is_silently_ignored() {
        let mut v = viewer(vec![layer("a"), layer("b")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        v.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        v.reorder_layer(5, 0);
        v.reorder_layer(0, 5);
        // Only the immediate subscription call happened
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(v.state().layers[0].id, "a");
    }

    #[test]
    fn test_reorder_moves_layer() {
        let mut v = viewer(vec![layer("a"), layer("b"), layer("c")]);
        v.reorder_layer(0, 2);
        let ids: Vec<_> = v.state().layers.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_update_unknown_layer_is_ignored() {
        let mut v = viewer(vec![layer("a")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        v.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        v.update_layer("missing", LayerUpdate::default()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compare_mode_toggle_is_noop_when_unchanged() {
        let mut v = viewer(vec![layer("a")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        v.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        v.set_compare_mode(false).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        v.set_compare_mode(true).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(v.state().is_compare_mode);
    }
}
