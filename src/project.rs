//! # Project File Generator
//!
//! Regenerates the Visual Studio project file (`.vcxproj`) and its companion
//! filters file from the on-disk source tree. This is the one piece of the
//! tool with real data shaping:
//!
//! 1. Parse the existing project file and strip every `ItemGroup` that lists
//!    source files, leaving configuration groups (toolset, compiler flags,
//!    globals) untouched.
//! 2. Walk the source tree, classify each file by extension, and append one
//!    rebuilt `ItemGroup` carrying the per-file precompiled-header and
//!    warning-suppression overrides.
//! 3. Build the filters file from scratch: one `Filter` per directory below
//!    the source root with a stable name-derived identifier, plus one entry
//!    per source file referencing its directory's filter.
//!
//! Output is deterministic: the walk is sorted and filter identifiers are
//! name-hashed, so regenerating over an unchanged tree is a byte-identical
//! no-op. That keeps the files diff-clean in version control and stops
//! Visual Studio from rewriting them on open.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::xml::{self, Element, Node};

/// Namespace used by MSBuild project files.
pub const MSBUILD_NAMESPACE: &str = "http://schemas.microsoft.com/developer/msbuild/2003";

/// The source file that creates the precompiled header. Matched by exact
/// file name anywhere in the tree.
pub const PCH_SOURCE_NAME: &str = "precompiled.cpp";

/// Warning suppressions applied to generated (protobuf output) sources.
const GENERATED_OPTIONS: &str = "/wd4125 /wd4127 /wd4244 /wd4267 %(AdditionalOptions)";

/// Configuration/platform pairs the generated-source overrides are emitted for.
const CONFIGURATIONS: [&str; 2] = ["Release|x64", "Debug|x64"];

/// How a recognized extension participates in the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionClass {
    /// `.cpp` — compiled, uses the precompiled header implicitly.
    CompileWithPch,
    /// `.c` — compiled with the precompiled header explicitly disabled.
    CompileNoPch,
    /// `.cc` — generated (protobuf) output: no PCH, noisy warnings silenced.
    CompileGenerated,
    /// `.h` / `.hpp` — listed for the IDE, never compiled directly.
    HeaderOnly,
}

impl ExtensionClass {
    /// Classify a file name by extension. Anything outside the fixed table
    /// is not part of the project and returns `None`.
    pub fn classify(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?;
        match extension {
            "cpp" => Some(Self::CompileWithPch),
            "c" => Some(Self::CompileNoPch),
            "cc" => Some(Self::CompileGenerated),
            "h" | "hpp" => Some(Self::HeaderOnly),
            _ => None,
        }
    }

    /// The MSBuild item type this class is listed under.
    pub fn item_type(self) -> &'static str {
        match self {
            Self::HeaderOnly => "ClInclude",
            _ => "ClCompile",
        }
    }
}

/// One recognized file discovered under the source root. Lives only for the
/// duration of a generation run.
#[derive(Debug, Clone)]
struct SourceFile {
    /// Project-relative include path with backslash separators,
    /// e.g. `code\math\vector.cpp`.
    include_path: String,
    file_name: String,
    /// Backslash-joined directory path below the source root, or `None` for
    /// files sitting directly at the root.
    filter: Option<String>,
    class: ExtensionClass,
}

/// Generate the project and filters files.
///
/// `source_root` must be an existing directory; `existing_project` must be a
/// well-formed MSBuild project document whose non-source configuration is
/// preserved. Both output files are overwritten in full.
pub fn generate(
    source_root: &Path,
    existing_project: &Path,
    out_project: &Path,
    out_filters: &Path,
) -> Result<()> {
    if !source_root.is_dir() {
        bail!("source root {} does not exist", source_root.display());
    }
    let prefix = source_root
        .file_name()
        .and_then(|n| n.to_str())
        .context("source root has no usable directory name")?
        .to_string();

    let project_text = fs::read_to_string(existing_project)
        .with_context(|| format!("cannot read project file {}", existing_project.display()))?;
    let mut project = xml::parse(&project_text)
        .with_context(|| format!("cannot parse project file {}", existing_project.display()))?;

    let (files, directories) = collect_sources(source_root, &prefix)?;
    debug!(
        "discovered {} source files, {} directories",
        files.len(),
        directories.len()
    );

    strip_source_groups(&mut project);
    append_source_group(&mut project, &files);
    fs::write(out_project, xml::msvc_format(&xml::render(&project)?))
        .with_context(|| format!("cannot write {}", out_project.display()))?;

    let filters = build_filters_document(&files, &directories);
    fs::write(out_filters, xml::msvc_format(&xml::render(&filters)?))
        .with_context(|| format!("cannot write {}", out_filters.display()))?;

    Ok(())
}

/// Walk the source tree in sorted order, returning every recognized file and
/// every directory below the root (the filters).
fn collect_sources(source_root: &Path, prefix: &str) -> Result<(Vec<SourceFile>, Vec<String>)> {
    let mut files = Vec::new();
    let mut directories = Vec::new();

    for entry in WalkDir::new(source_root).sort_by_file_name() {
        let entry = entry.context("cannot walk source tree")?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source_root)
            .expect("walk entries live under the root");

        if entry.file_type().is_dir() {
            directories.push(backslashed(relative));
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(class) = ExtensionClass::classify(&file_name) else {
            continue;
        };
        let filter = relative
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(backslashed);
        files.push(SourceFile {
            include_path: format!("{prefix}\\{}", backslashed(relative)),
            file_name,
            filter,
            class,
        });
    }

    Ok((files, directories))
}

/// Join a relative path's components with backslashes, whatever the host
/// separator is. The project file format is Windows-only.
fn backslashed(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("\\")
}

/// Remove every top-level `ItemGroup` that lists source files, along with the
/// whitespace that trailed it. Groups holding anything else (property groups,
/// import groups, non-source item groups) are left exactly as found.
fn strip_source_groups(project: &mut Element) {
    let mut index = 0;
    while index < project.children.len() {
        let is_source_group = match &project.children[index] {
            Node::Element(el) => {
                el.name == "ItemGroup"
                    && el
                        .elements()
                        .any(|item| item.name == "ClCompile" || item.name == "ClInclude")
            }
            _ => false,
        };
        if is_source_group {
            project.children.remove(index);
            if let Some(Node::Text(tail)) = project.children.get(index) {
                if tail.trim().is_empty() {
                    project.children.remove(index);
                }
            }
        } else {
            index += 1;
        }
    }
}

/// Append one rebuilt `ItemGroup` listing every discovered source file.
fn append_source_group(project: &mut Element, files: &[SourceFile]) {
    let mut group = Element::new("ItemGroup");
    group.children.push(Node::Text("\n    ".into()));
    for file in files {
        group.children.push(Node::Element(project_item(file)));
        group.children.push(Node::Text("\n    ".into()));
    }
    project.children.push(Node::Element(group));
    project.children.push(Node::Text("\n  ".into()));
}

/// Build one `ClCompile`/`ClInclude` entry with its per-class overrides.
fn project_item(file: &SourceFile) -> Element {
    let mut item = Element::new(file.class.item_type());
    item.set_attr("Include", file.include_path.clone());

    if file.file_name == PCH_SOURCE_NAME {
        // This file creates the precompiled header, whatever its class.
        item.children.push(Node::Text("\n      ".into()));
        push_with_tail(&mut item, text_element("PrecompiledHeader", "Create"));
    } else if file.class == ExtensionClass::CompileNoPch {
        push_with_tail(&mut item, text_element("PrecompiledHeader", "NotUsing"));
    } else if file.class == ExtensionClass::CompileGenerated {
        push_with_tail(&mut item, text_element("PrecompiledHeader", "NotUsing"));
        for configuration in CONFIGURATIONS {
            let mut options = Element::new("AdditionalOptions");
            options.set_attr(
                "Condition",
                format!("'$(Configuration)|$(Platform)'=='{configuration}'"),
            );
            options.children.push(Node::Text(GENERATED_OPTIONS.into()));
            push_with_tail(&mut item, options);
        }
    }

    item
}

/// Build the filters document: one `Filter` per directory, then one mirrored
/// entry per source file.
fn build_filters_document(files: &[SourceFile], directories: &[String]) -> Element {
    let mut root = Element::new("Project");
    root.set_attr("ToolsVersion", "4.0");
    root.set_attr("xmlns", MSBUILD_NAMESPACE);
    root.children.push(Node::Text("\n  ".into()));

    let mut filter_group = Element::new("ItemGroup");
    filter_group.children.push(Node::Text("\n    ".into()));
    for directory in directories {
        let mut filter = Element::new("Filter");
        filter.set_attr("Include", directory.clone());
        filter.children.push(Node::Text("\n      ".into()));
        push_with_tail(
            &mut filter,
            text_element("UniqueIdentifier", filter_identifier(directory)),
        );
        filter_group.children.push(Node::Element(filter));
        filter_group.children.push(Node::Text("\n    ".into()));
    }
    root.children.push(Node::Element(filter_group));
    root.children.push(Node::Text("\n  ".into()));

    let mut file_group = Element::new("ItemGroup");
    file_group.children.push(Node::Text("\n    ".into()));
    for file in files {
        let mut item = Element::new(file.class.item_type());
        item.set_attr("Include", file.include_path.clone());
        if let Some(filter) = &file.filter {
            item.children.push(Node::Text("\n      ".into()));
            push_with_tail(&mut item, text_element("Filter", filter.clone()));
        }
        file_group.children.push(Node::Element(item));
        file_group.children.push(Node::Text("\n    ".into()));
    }
    root.children.push(Node::Element(file_group));
    root.children.push(Node::Text("\n  ".into()));

    root
}

/// Deterministic, name-derived filter identifier. Hashing the hierarchical
/// name (rather than generating a random UUID) keeps regeneration idempotent.
fn filter_identifier(directory: &str) -> String {
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, directory.as_bytes());
    format!("{{{id}}}")
}

fn text_element(name: &str, text: impl Into<String>) -> Element {
    let mut el = Element::new(name);
    el.children.push(Node::Text(text.into()));
    el
}

fn push_with_tail(parent: &mut Element, child: Element) {
    parent.children.push(Node::Element(child));
    parent.children.push(Node::Text("\n    ".into()));
}
