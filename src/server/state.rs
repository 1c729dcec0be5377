use crate::annotate::ImageAnnotator;
use crate::lookup::Lookup;
use crate::providers::Provider;

#[derive(Clone)]
pub(crate) struct ServerState<P: Provider + Clone> {
    pub(crate) lookup: Lookup<P>,
    pub(crate) annotator: ImageAnnotator,
}
