mod format;
mod multivector;
mod raw_data;
mod reader;
mod vector;
mod writer;

pub use format::{
    ArchiveHeader, ResourceEntry, ResourceKindTag, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR,
    HEADER_SIZE, MAGIC_NUMBER, MAX_NAME_LENGTH, RESOURCE_ENTRY_SIGNATURE,
};
pub use multivector::{ItemIter, MultivectorView};
pub use raw_data::RawDataView;
pub use reader::{Archive, BindOptions};
pub use vector::VectorView;
pub use writer::{ArchiveBuilder, MultivectorWriter, RawDataWriter, VectorWriter};
