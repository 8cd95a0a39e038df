mod catalog;
mod compiler;

pub use catalog::{Template, TemplateCatalog, PREPLACED_TAG};
pub use compiler::{
    compile_template_catalog, compile_template_catalog_from_str, ContentCompileError,
    ContentErrorCode, SourceLocation,
};
