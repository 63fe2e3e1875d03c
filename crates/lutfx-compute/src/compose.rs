//! Effect composition: LUT transform + cross-fade.
//!
//! ```text
//! bitmap --> [TableTransfer | LookupTable3D] --> input 0 \
//!                                                         CrossFade(weight) --> effect
//! bitmap ------------------------------------------> input 1 /
//! ```

use std::path::Path;
use std::sync::Arc;

use tracing::trace;

use crate::backend::{GraphicsBackend, TransformKind, TransformStage};
use crate::cache::{CompiledLut, CubeFileReader, CubeReader, LutCache};
use crate::ComputeResult;

/// Builds cross-fade effects around compiled LUTs.
pub struct EffectComposer<B: GraphicsBackend> {
    backend: Arc<B>,
}

impl<B: GraphicsBackend> EffectComposer<B> {
    /// Creates a composer that builds effects on `backend`.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Wire `lut` and a cross-fade into an effect over `bitmap`.
    ///
    /// `weight` is not clamped; 0 keeps the original, 1 is fully graded.
    pub fn compose(
        &self,
        lut: &CompiledLut<B::Lut>,
        bitmap: &B::Bitmap,
        weight: f32,
    ) -> ComputeResult<B::Effect> {
        let kind = TransformKind::for_dimension(lut.dimension());
        trace!(?kind, size = lut.size(), weight, "compose LUT effect");

        let stage = TransformStage {
            kind,
            lut: lut.handle(),
            input: bitmap,
        };
        self.backend.compile_cross_fade(stage, bitmap, weight)
    }
}

/// Cache plus composer: a graded effect for `(path, weight)` in one call.
pub struct LutRenderer<B: GraphicsBackend, R = CubeFileReader> {
    cache: LutCache<B, R>,
    composer: EffectComposer<B>,
}

impl<B: GraphicsBackend> LutRenderer<B, CubeFileReader> {
    /// Creates a renderer reading .cube files from disk.
    pub fn new(backend: Arc<B>) -> Self {
        Self::from_cache(LutCache::new(backend))
    }
}

impl<B: GraphicsBackend, R: CubeReader> LutRenderer<B, R> {
    /// Wrap an existing cache.
    pub fn from_cache(cache: LutCache<B, R>) -> Self {
        let composer = EffectComposer::new(Arc::clone(cache.backend()));
        Self { cache, composer }
    }

    /// Load (or reuse) the LUT at `path` and compose it over `bitmap`.
    pub fn create_effect(
        &self,
        path: impl AsRef<Path>,
        weight: f32,
        bitmap: &B::Bitmap,
    ) -> ComputeResult<B::Effect> {
        let lut = self.cache.get_or_compile(path)?;
        self.composer.compose(&lut, bitmap, weight)
    }

    /// Drop every compiled LUT.
    pub fn reload(&self) {
        self.cache.invalidate_all();
    }

    /// Drop the compiled LUT for one file.
    pub fn reload_path(&self, path: impl AsRef<Path>) {
        self.cache.invalidate(path);
    }

    /// The underlying LUT cache.
    pub fn cache(&self) -> &LutCache<B, R> {
        &self.cache
    }

    /// The effect composer.
    pub fn composer(&self) -> &EffectComposer<B> {
        &self.composer
    }
}
