use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::containment::ComponentOffset;
use crate::AppPaths;

use super::database::{
    ComponentDef, DefDatabase, PluginDefId, PluginDefRecord, ThingDefId, ThingDefRecord, ThingKind,
};
use super::discovery::{discover_mod_sources, ContentDiscoveryError};
use super::hashing::{normalize_rel_path, ContentHasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
enum PendingDef {
    Thing(ThingDefRecord),
    Plugin(PluginDefRecord),
}

impl PendingDef {
    fn def_name(&self) -> &str {
        match self {
            Self::Thing(def) => &def.def_name,
            Self::Plugin(def) => &def.def_name,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Thing(_) => "ThingDef",
            Self::Plugin(_) => "PluginDef",
        }
    }
}

struct ParseCtx<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl ParseCtx<'_, '_> {
    fn error_at(&self, code: ContentErrorCode, message: String, node: Node<'_, '_>) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message,
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }

    fn required_text(&self, node: Node<'_, '_>, field_name: &str) -> Result<String, ContentCompileError> {
        let value = node.text().map(str::trim).unwrap_or_default().to_string();
        if value.is_empty() {
            return Err(self.error_at(
                ContentErrorCode::MissingField,
                format!("field <{}> must not be empty", field_name),
                node,
            ));
        }
        Ok(value)
    }

    fn list_items<'n, 'i>(
        &self,
        node: Node<'n, 'i>,
        field_name: &str,
    ) -> Result<Vec<(String, Node<'n, 'i>)>, ContentCompileError> {
        let mut items = Vec::new();
        for item in node.children().filter(|child| child.is_element()) {
            if item.tag_name().name() != "li" {
                return Err(self.error_at(
                    ContentErrorCode::UnknownField,
                    format!(
                        "unexpected <{}> in <{}>; list entries must be <li>",
                        item.tag_name().name(),
                        field_name
                    ),
                    item,
                ));
            }
            items.push((self.required_text(item, "li")?, item));
        }
        Ok(items)
    }
}

/// Compiles base content plus `enabled_mods` into one database. A def name may appear once
/// per mod; a later mod may override an earlier mod's def of the same type.
pub fn compile_def_database(
    app_paths: &AppPaths,
    enabled_mods: &[String],
) -> Result<DefDatabase, ContentCompileError> {
    let sources = discover_mod_sources(app_paths, enabled_mods)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut things = BTreeMap::<String, ThingDefRecord>::new();
    let mut plugins = BTreeMap::<String, PluginDefRecord>::new();
    let mut hasher = ContentHasher::new();
    let mod_count = sources.len();

    for source in sources {
        if !source.source_dir.is_dir() {
            continue;
        }
        hasher.begin_mod(&source.mod_id);
        let xml_files = collect_xml_files_sorted(&source.source_dir)
            .map_err(|(path, error)| read_error(&source.mod_id, path, error))?;
        let mut seen_in_mod = HashSet::<String>::new();

        for (rel, xml_file) in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            hasher.add_file(&rel, raw.as_bytes());
            for def in parse_defs_document(&source.mod_id, &xml_file, &raw)? {
                if !seen_in_mod.insert(def.def_name().to_string()) {
                    return Err(ContentCompileError {
                        code: ContentErrorCode::DuplicateDefInMod,
                        message: format!(
                            "duplicate {} '{}' in mod '{}'; each mod may define a defName only once",
                            def.type_name(),
                            def.def_name(),
                            source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: None,
                    });
                }
                match def {
                    PendingDef::Thing(def) => {
                        things.insert(def.def_name.clone(), def);
                    }
                    PendingDef::Plugin(def) => {
                        plugins.insert(def.def_name.clone(), def);
                    }
                }
            }
        }
    }

    let xml_file_count = hasher.xml_file_count();
    let db = DefDatabase::from_defs(
        things.into_values().collect(),
        plugins.into_values().collect(),
        hasher.finish(),
    );
    info!(
        mods = mod_count,
        xml_files = xml_file_count,
        thing_defs = db.thing_defs().len(),
        plugin_defs = db.plugin_defs().len(),
        fingerprint = %db.fingerprint(),
        "content_compiled"
    );
    Ok(db)
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<PendingDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = ParseCtx {
        mod_id,
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::<PendingDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "ThingDef" => defs.push(PendingDef::Thing(parse_thing_def(&ctx, child)?)),
            "PluginDef" => defs.push(PendingDef::Plugin(parse_plugin_def(&ctx, child)?)),
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!("unsupported def type <{other}>; expected <ThingDef> or <PluginDef>"),
                    child,
                ))
            }
        }
    }

    Ok(defs)
}

fn parse_thing_def(ctx: &ParseCtx<'_, '_>, node: Node<'_, '_>) -> Result<ThingDefRecord, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut kind: Option<ThingKind> = None;
    let mut trigger_groups = Vec::<String>::new();
    let mut components = Vec::<ComponentDef>::new();
    let mut components_node = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(ctx.error_at(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <ThingDef>", field_name),
                field,
            ));
        }

        match field_name.as_str() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "kind" => {
                let value = ctx.required_text(field, "kind")?;
                kind = Some(ThingKind::parse(&value).ok_or_else(|| {
                    ctx.error_at(
                        ContentErrorCode::InvalidValue,
                        format!("invalid kind '{}'; allowed values: {}", value, ThingKind::ALLOWED),
                        field,
                    )
                })?);
            }
            "triggerGroups" => {
                trigger_groups = ctx
                    .list_items(field, "triggerGroups")?
                    .into_iter()
                    .map(|(name, _)| name)
                    .collect();
            }
            "components" => {
                for (value, item) in ctx.list_items(field, "components")? {
                    components.push(parse_component(ctx, &value, item)?);
                }
                components_node = Some(field);
            }
            _ => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <ThingDef>", field_name),
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <defName> in <ThingDef>".to_string(),
            node,
        ));
    };
    let Some(kind) = kind else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <kind> in <ThingDef>".to_string(),
            node,
        ));
    };
    if let Some(field) = components_node {
        if kind != ThingKind::Multi {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("<components> is only allowed on multi things, not {}", kind.as_str()),
                field,
            ));
        }
    }

    Ok(ThingDefRecord {
        id: ThingDefId(0),
        def_name,
        kind,
        trigger_groups,
        components,
    })
}

fn parse_plugin_def(ctx: &ParseCtx<'_, '_>, node: Node<'_, '_>) -> Result<PluginDefRecord, ContentCompileError> {
    let mut seen_fields = HashSet::<String>::new();
    let mut def_name: Option<String> = None;
    let mut trigger_group: Option<String> = None;
    let mut compiled: Option<String> = None;

    for field in node.children().filter(|child| child.is_element()) {
        let field_name = field.tag_name().name().to_string();
        if !seen_fields.insert(field_name.clone()) {
            return Err(ctx.error_at(
                ContentErrorCode::DuplicateField,
                format!("duplicate field <{}> in <PluginDef>", field_name),
                field,
            ));
        }
        match field_name.as_str() {
            "defName" => def_name = Some(ctx.required_text(field, "defName")?),
            "triggerGroup" => trigger_group = Some(ctx.required_text(field, "triggerGroup")?),
            "compiled" => compiled = Some(ctx.required_text(field, "compiled")?),
            _ => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{}> in <PluginDef>", field_name),
                    field,
                ))
            }
        }
    }

    let Some(def_name) = def_name else {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            "missing required field <defName> in <PluginDef>".to_string(),
            node,
        ));
    };

    Ok(PluginDefRecord {
        id: PluginDefId(0),
        def_name,
        trigger_group,
        compiled,
    })
}

/// `model,x,y,z` with the model in decimal or `0x` hex.
fn parse_component(
    ctx: &ParseCtx<'_, '_>,
    value: &str,
    node: Node<'_, '_>,
) -> Result<ComponentDef, ContentCompileError> {
    let invalid = || {
        ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!("component '{}' must be model,x,y,z", value),
            node,
        )
    };
    let parts = value.split(',').map(str::trim).collect::<Vec<_>>();
    let [model, x, y, z] = parts.as_slice() else {
        return Err(invalid());
    };
    let model = match model.strip_prefix("0x").or_else(|| model.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => model.parse::<u16>(),
    }
    .map_err(|_| invalid())?;
    Ok(ComponentDef {
        model,
        offset: ComponentOffset {
            x: x.parse().map_err(|_| invalid())?,
            y: y.parse().map_err(|_| invalid())?,
            z: z.parse().map_err(|_| invalid())?,
        },
    })
}

/// Every `.xml` file under `root`, keyed and ordered by its normalized relative path.
fn collect_xml_files_sorted(
    root: &Path,
) -> Result<BTreeMap<String, PathBuf>, (PathBuf, io::Error)> {
    let mut found = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|error| (dir.clone(), error))?;
        for entry in entries {
            let path = entry.map_err(|error| (dir.clone(), error))?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let is_xml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
            if is_xml {
                let rel = normalize_rel_path(path.strip_prefix(root).unwrap_or(&path));
                found.insert(rel, path);
            }
        }
    }
    Ok(found)
}

fn read_error(mod_id: &str, path: PathBuf, source: io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}

fn map_discovery_error(error: ContentDiscoveryError, root: &Path) -> ContentCompileError {
    match error {
        ContentDiscoveryError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}
