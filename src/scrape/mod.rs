//! Page scraping primitives: paginated resources and declarative
//! field extraction.

pub mod extract;
pub mod paginate;

pub use extract::{Capture, ExtractionRule, NodeTransform, ValueTransform};
pub use paginate::PaginatedResource;
