mod master;
mod sector;

pub use master::MasterPage;
pub use sector::{MetadataHeader, MetadataItem};
