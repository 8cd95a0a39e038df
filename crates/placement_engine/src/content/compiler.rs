use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec3;
use roxmltree::{Document, Node};
use tracing::info;

use crate::geometry::BoxShape;
use crate::host::LayerMask;

use super::catalog::{Template, TemplateCatalog};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateTemplate,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

/// Compiles every `*.xml` file under `templates_dir` (sorted by relative path)
/// into one catalog. A template id may be defined only once across all files.
pub fn compile_template_catalog(
    templates_dir: &Path,
) -> Result<TemplateCatalog, ContentCompileError> {
    let xml_files = collect_xml_files_sorted(templates_dir)
        .map_err(|error| read_error(error.path, error.source))?;

    let mut templates = Vec::<Template>::new();
    let mut first_seen = HashMap::<String, PathBuf>::new();

    for xml_file in &xml_files {
        let raw = fs::read_to_string(xml_file)
            .map_err(|source| read_error(xml_file.clone(), source))?;
        for template in parse_templates_document(xml_file, &raw)? {
            if let Some(previous) = first_seen.get(&template.id) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateTemplate,
                    message: format!(
                        "duplicate template '{}' (first defined in {})",
                        template.id,
                        previous.display()
                    ),
                    file_path: xml_file.clone(),
                    location: None,
                });
            }
            first_seen.insert(template.id.clone(), xml_file.clone());
            templates.push(template);
        }
    }

    info!(
        templates_dir = %templates_dir.display(),
        file_count = xml_files.len(),
        template_count = templates.len(),
        "template_catalog_compiled"
    );
    Ok(TemplateCatalog::from_templates(templates))
}

/// Single-document variant of [`compile_template_catalog`]; `file_path` is only
/// used for error reporting.
pub fn compile_template_catalog_from_str(
    file_path: &Path,
    raw: &str,
) -> Result<TemplateCatalog, ContentCompileError> {
    let templates = parse_templates_document(file_path, raw)?;
    let mut seen = HashSet::<&str>::new();
    for template in &templates {
        if !seen.insert(template.id.as_str()) {
            return Err(ContentCompileError {
                code: ContentErrorCode::DuplicateTemplate,
                message: format!("duplicate template '{}'", template.id),
                file_path: file_path.to_path_buf(),
                location: None,
            });
        }
    }
    Ok(TemplateCatalog::from_templates(templates))
}

fn parse_templates_document(
    file_path: &Path,
    raw: &str,
) -> Result<Vec<Template>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "Templates" {
        return Err(error_at_node(
            ContentErrorCode::InvalidRoot,
            "root element must be <Templates>".to_string(),
            file_path,
            &doc,
            root,
        ));
    }

    let mut templates = Vec::<Template>::new();
    for child in root.children().filter(|node| node.is_element()) {
        if child.tag_name().name() != "Template" {
            return Err(error_at_node(
                ContentErrorCode::UnknownElement,
                format!(
                    "unsupported element <{}>; only <Template> is allowed here",
                    child.tag_name().name()
                ),
                file_path,
                &doc,
                child,
            ));
        }
        templates.push(parse_template(file_path, &doc, child)?);
    }

    Ok(templates)
}

fn parse_template(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<Template, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut id: Option<String> = None;
    let mut label: Option<String> = None;
    let mut category: Option<String> = None;
    let mut shape: Option<BoxShape> = None;
    let mut parts = Vec::<BoxShape>::new();
    let mut scale: Option<Vec3> = None;
    let mut layers: Option<LayerMask> = None;
    let mut tags = Vec::<String>::new();

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(error_at_node(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <Template>", field_name),
                file_path,
                doc,
                field,
            ));
        }

        match field_name.as_str() {
            "id" => id = Some(required_text(file_path, doc, field, "id")?),
            "label" => label = Some(required_text(file_path, doc, field, "label")?),
            "category" => category = Some(required_text(file_path, doc, field, "category")?),
            "shape" => shape = Some(parse_box(file_path, doc, field)?),
            "parts" => {
                for part in field.children().filter(|child| child.is_element()) {
                    if part.tag_name().name() != "part" {
                        return Err(error_at_node(
                            ContentErrorCode::UnknownElement,
                            format!(
                                "unsupported element <{}> in <parts>; expected <part>",
                                part.tag_name().name()
                            ),
                            file_path,
                            doc,
                            part,
                        ));
                    }
                    parts.push(parse_box(file_path, doc, part)?);
                }
            }
            "scale" => {
                let x = attr_f32(file_path, doc, field, "x", Some(1.0))?;
                let y = attr_f32(file_path, doc, field, "y", Some(1.0))?;
                let z = attr_f32(file_path, doc, field, "z", Some(1.0))?;
                if x == 0.0 || y == 0.0 || z == 0.0 {
                    return Err(error_at_node(
                        ContentErrorCode::InvalidValue,
                        "scale components must be non-zero".to_string(),
                        file_path,
                        doc,
                        field,
                    ));
                }
                scale = Some(Vec3::new(x, y, z));
            }
            "layer" => {
                let value = required_text(file_path, doc, field, "layer")?;
                let parsed = LayerMask::from_name(&value).ok_or_else(|| {
                    error_at_node(
                        ContentErrorCode::InvalidValue,
                        format!(
                            "invalid layer '{}'; allowed values: default, furniture, static",
                            value
                        ),
                        file_path,
                        doc,
                        field,
                    )
                })?;
                layers = Some(parsed);
            }
            "tags" => {
                tags = field
                    .text()
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
            }
            _ => {
                return Err(error_at_node(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <Template>", field_name),
                    file_path,
                    doc,
                    field,
                ))
            }
        }
    }

    let Some(id) = id else {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            "missing required field <id> in <Template>".to_string(),
            file_path,
            doc,
            node,
        ));
    };
    let Some(category) = category else {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("missing required field <category> in <Template> '{id}'"),
            file_path,
            doc,
            node,
        ));
    };
    if shape.is_none() && !parts.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("template '{id}' declares <parts> without a <shape>"),
            file_path,
            doc,
            node,
        ));
    }

    Ok(Template {
        label: label.unwrap_or_else(|| id.clone()),
        id,
        category,
        shape,
        parts,
        scale: scale.unwrap_or(Vec3::ONE),
        layers: layers.unwrap_or(LayerMask::FURNITURE),
        tags,
    })
}

fn parse_box(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> Result<BoxShape, ContentCompileError> {
    let center = Vec3::new(
        attr_f32(file_path, doc, node, "cx", Some(0.0))?,
        attr_f32(file_path, doc, node, "cy", Some(0.0))?,
        attr_f32(file_path, doc, node, "cz", Some(0.0))?,
    );
    let half_extents = Vec3::new(
        attr_f32(file_path, doc, node, "hx", None)?,
        attr_f32(file_path, doc, node, "hy", None)?,
        attr_f32(file_path, doc, node, "hz", None)?,
    );
    if half_extents.min_element() <= 0.0 {
        return Err(error_at_node(
            ContentErrorCode::InvalidValue,
            format!(
                "<{}> half extents must be > 0",
                node.tag_name().name()
            ),
            file_path,
            doc,
            node,
        ));
    }
    Ok(BoxShape::new(center, half_extents))
}

fn attr_f32(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    name: &str,
    default: Option<f32>,
) -> Result<f32, ContentCompileError> {
    let Some(raw) = node.attribute(name) else {
        return default.ok_or_else(|| {
            error_at_node(
                ContentErrorCode::MissingField,
                format!(
                    "missing attribute '{}' on <{}>",
                    name,
                    node.tag_name().name()
                ),
                file_path,
                doc,
                node,
            )
        });
    };
    let parsed = raw.trim().parse::<f32>().map_err(|_| {
        error_at_node(
            ContentErrorCode::InvalidValue,
            format!("attribute {}='{}' is not a valid number", name, raw),
            file_path,
            doc,
            node,
        )
    })?;
    if !parsed.is_finite() {
        return Err(error_at_node(
            ContentErrorCode::InvalidValue,
            format!("attribute '{}' must be finite", name),
            file_path,
            doc,
            node,
        ));
    }
    Ok(parsed)
}

fn required_text(
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(error_at_node(
            ContentErrorCode::MissingField,
            format!("field <{}> must not be empty", field_name),
            file_path,
            doc,
            node,
        ));
    }
    Ok(value)
}

fn error_at_node(
    code: ContentErrorCode,
    message: String,
    file_path: &Path,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> ContentCompileError {
    let pos = doc.text_pos_at(node.range().start);
    ContentCompileError {
        code,
        message,
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }),
    }
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read template XML: {source}"),
        file_path: path,
        location: None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn compile_str(raw: &str) -> Result<TemplateCatalog, ContentCompileError> {
        compile_template_catalog_from_str(Path::new("inline.xml"), raw)
    }

    #[test]
    fn valid_template_compiles_with_defaults() {
        let catalog = compile_str(
            r#"<Templates>
                <Template><id>shelf</id><category>storage</category><shape hx="0.5" hy="0.5" hz="0.5"/></Template>
            </Templates>"#,
        )
        .expect("compile");
        let shelf = catalog.template("shelf").expect("shelf");
        assert_eq!(shelf.label, "shelf");
        assert_eq!(shelf.category, "storage");
        assert_eq!(shelf.scale, Vec3::ONE);
        assert_eq!(shelf.layers, LayerMask::FURNITURE);
        let shape = shelf.shape.expect("shape");
        assert_eq!(shape.center, Vec3::ZERO);
        assert_eq!(shape.half_extents, Vec3::splat(0.5));
    }

    #[test]
    fn template_without_shape_has_no_geometry() {
        let catalog = compile_str(
            r#"<Templates><Template><id>poster</id><category>decor</category></Template></Templates>"#,
        )
        .expect("compile");
        assert!(catalog.template("poster").expect("poster").shape.is_none());
    }

    #[test]
    fn parts_tags_scale_and_layer_are_parsed() {
        let catalog = compile_str(
            r#"<Templates>
                <Template>
                    <id>counter</id>
                    <label>Checkout Counter</label>
                    <category>fixture</category>
                    <shape cy="0.5" hx="1" hy="0.5" hz="0.4"/>
                    <parts><part cx="0.8" cy="1.1" hx="0.1" hy="0.1" hz="0.1"/></parts>
                    <scale x="2" y="1" z="1"/>
                    <layer>static</layer>
                    <tags>preplaced till</tags>
                </Template>
            </Templates>"#,
        )
        .expect("compile");
        let counter = catalog.template("counter").expect("counter");
        assert_eq!(counter.label, "Checkout Counter");
        assert_eq!(counter.parts.len(), 1);
        assert_eq!(counter.scale, Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(counter.layers, LayerMask::STATIC);
        assert!(counter.is_preplaced());
        assert!(counter.has_tag("till"));
    }

    #[test]
    fn missing_id_reports_location() {
        let err = compile_str(r#"<Templates><Template><category>x</category></Template></Templates>"#)
            .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err.location.is_some());
    }

    #[test]
    fn unknown_field_errors() {
        let err = compile_str(
            r#"<Templates><Template><id>a</id><category>x</category><price>4</price></Template></Templates>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownField);
    }

    #[test]
    fn duplicate_field_errors() {
        let err = compile_str(
            r#"<Templates><Template><id>a</id><id>b</id><category>x</category></Template></Templates>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateField);
    }

    #[test]
    fn non_positive_half_extent_is_invalid() {
        let err = compile_str(
            r#"<Templates><Template><id>a</id><category>x</category><shape hx="0" hy="1" hz="1"/></Template></Templates>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn malformed_number_is_invalid() {
        let err = compile_str(
            r#"<Templates><Template><id>a</id><category>x</category><shape hx="wide" hy="1" hz="1"/></Template></Templates>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = compile_str(r#"<Defs/>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidRoot);
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = compile_str(r#"<Templates><Template><id>a</id></Templates>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn directory_compile_merges_files_and_rejects_duplicates() {
        let temp = TempDir::new().expect("temp");
        write_file(
            &temp.path().join("a.xml"),
            r#"<Templates><Template><id>shelf</id><category>storage</category><shape hx="1" hy="1" hz="1"/></Template></Templates>"#,
        );
        write_file(
            &temp.path().join("nested").join("b.xml"),
            r#"<Templates><Template><id>bin</id><category>storage</category><shape hx="1" hy="1" hz="1"/></Template></Templates>"#,
        );
        let catalog = compile_template_catalog(temp.path()).expect("compile");
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.templates()[0].id, "shelf");
        assert_eq!(catalog.templates()[1].id, "bin");

        write_file(
            &temp.path().join("z.xml"),
            r#"<Templates><Template><id>shelf</id><category>storage</category></Template></Templates>"#,
        );
        let err = compile_template_catalog(temp.path()).expect_err("duplicate");
        assert_eq!(err.code, ContentErrorCode::DuplicateTemplate);
        assert!(err.file_path.ends_with("z.xml"));
    }

    #[test]
    fn missing_directory_is_a_read_error() {
        let temp = TempDir::new().expect("temp");
        let err = compile_template_catalog(&temp.path().join("absent")).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::ReadFile);
    }
}
