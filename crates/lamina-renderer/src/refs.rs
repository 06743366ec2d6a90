//! Render binding lists.
//!
//! Every pass flattens layers × objects × layer configs into an ordered list
//! of instances. The order is the GPU slot order.

use std::collections::HashMap;
use std::future::Future;

use log::error;

use lamina_core::layer::{Layer, LayerId};
use lamina_core::object::{LayerConfig, ObjectId, OverlayObject};
use lamina_io::{DataError, Loaded};

use crate::diagnostics::{Diagnostics, Warning};
use crate::sync::SyncError;

/// Identity of a rendered instance across passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefKey {
    pub layer_id: LayerId,
    pub object_id: ObjectId,
    pub config_index: usize,
}

/// One (layer, object, layer config) instance.
#[derive(Debug)]
pub struct RenderRef<'a, O> {
    pub layer: &'a Layer,
    pub object: &'a O,
    pub config_index: usize,
    pub config: &'a LayerConfig,
}

impl<O: OverlayObject> RenderRef<'_, O> {
    pub fn key(&self) -> RefKey {
        RefKey {
            layer_id: self.layer.id.clone(),
            object_id: self.object.id().clone(),
            config_index: self.config_index,
        }
    }
}

/// A render ref with its object's data.
pub struct LoadedRef<'a, O, D: ?Sized> {
    pub render: RenderRef<'a, O>,
    pub data: Loaded<D>,
}

/// Instances of `objects` in `layers`, layer-major.
pub fn collect_refs<'a, O: OverlayObject>(
    layers: &'a [Layer],
    objects: &'a [O],
) -> Vec<RenderRef<'a, O>> {
    let mut refs = Vec::new();
    for layer in layers {
        for object in objects {
            for (config_index, config) in object.layer_configs().iter().enumerate() {
                if config.matches(layer) {
                    refs.push(RenderRef {
                        layer,
                        object,
                        config_index,
                        config,
                    });
                }
            }
        }
    }
    refs
}

/// Drops the tail beyond `cap`, with one warning.
pub fn truncate_refs<T>(
    refs: &mut Vec<T>,
    cap: usize,
    kind: &'static str,
    diagnostics: &mut Diagnostics,
) {
    if refs.len() > cap {
        diagnostics.push(Warning::Truncated {
            kind,
            dropped: refs.len() - cap,
            cap,
        });
        refs.truncate(cap);
    }
}

/// Loads the data of every ref, once per object. Refs whose object fails to
/// load are dropped; cancellation ends the whole pass.
pub(crate) async fn load_refs<'a, O, D, F, Fut>(
    refs: Vec<RenderRef<'a, O>>,
    kind: &str,
    diagnostics: &mut Diagnostics,
    mut load: F,
) -> Result<Vec<LoadedRef<'a, O, D>>, SyncError>
where
    O: OverlayObject,
    D: ?Sized,
    F: FnMut(&'a O) -> Fut,
    Fut: Future<Output = Result<Loaded<D>, DataError>>,
{
    let mut loaded: HashMap<ObjectId, Option<Loaded<D>>> = HashMap::new();
    let mut out = Vec::with_capacity(refs.len());
    for render in refs {
        let object: &'a O = render.object;
        let id = object.id();
        if !loaded.contains_key(id) {
            let result = match load(object).await {
                Ok(data) => Some(data),
                Err(err) => {
                    report_load_failure(kind, id, err, diagnostics)?;
                    None
                }
            };
            loaded.insert(id.clone(), result);
        }
        if let Some(Some(data)) = loaded.get(id) {
            out.push(LoadedRef {
                render,
                data: data.clone(),
            });
        }
    }
    Ok(out)
}

pub(crate) fn report_load_failure(
    kind: &str,
    object: &ObjectId,
    err: DataError,
    diagnostics: &mut Diagnostics,
) -> Result<(), SyncError> {
    if err.is_aborted() {
        return Err(SyncError::Aborted);
    }
    if err.is_config() {
        error!("{kind} object '{object}' is misconfigured: {err}");
    } else {
        diagnostics.push(Warning::LoadFailed {
            object: object.to_string(),
            message: err.to_string(),
        });
    }
    Ok(())
}
