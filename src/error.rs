//! Error types for rcx

use thiserror::Error;

/// Main error type for rcx operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("No nodes to export")]
    EmptyTree,

    #[error("No struct classes found")]
    NoClasses,

    #[error("Malformed ReClass XML: {0}")]
    MalformedXml(String),

    #[error("Node not found: id {0}")]
    NodeNotFound(u64),

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Command rejected: {0}")]
    Rejected(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// Result type alias for rcx operations
pub type Result<T> = std::result::Result<T, Error>;
