//! Document processing: normalization, resource extraction and path rewriting.

pub mod normalize;
pub mod resources;
pub mod style;

pub use normalize::{CONTENT_POLICY, normalize, strip_base};
pub use resources::{Resource, ResourceKind, extract_resources, rewrite_paths};
