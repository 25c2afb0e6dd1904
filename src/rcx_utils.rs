//! Layout file utility functions
//!
//! This module contains the operations behind the `rcx` command-line tool:
//! summarising, listing, converting and validating ReClass XML files,
//! generating headers, and viewing or patching a binary through a class.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{
    generator::{render_cpp, render_cpp_all},
    provider::Provider,
    reclass_xml::{export_to_file, import_from_file, ExportOptions, ImportOptions},
    utils::{create_glob_matcher, format_offset, format_size, matches_filter},
    Document, NodeKind, NodeTree,
};

fn open_tree(xml_path: &Path) -> Result<NodeTree> {
    import_from_file(xml_path, &ImportOptions::default())
        .with_context(|| format!("Failed to open {}", xml_path.display()))
}

fn find_class(tree: &NodeTree, class: &str) -> Result<usize> {
    tree.find_type(class)
        .ok_or_else(|| anyhow!("Class '{}' not found", class))
}

/// Show a summary of a ReClass XML file
pub fn show_info(xml_path: &Path) -> Result<()> {
    println!("Opening {}...", xml_path.display());
    let tree = open_tree(xml_path)?;
    let layout = tree.layout();

    let classes = tree.root_structs();
    let total_size: u64 = classes
        .iter()
        .map(|&i| u64::from(layout.byte_size(i)))
        .sum();

    let mut kinds: BTreeMap<&'static str, u64> = BTreeMap::new();
    for node in tree.iter().filter(|n| !n.is_root()) {
        *kinds.entry(node.kind.as_str()).or_default() += 1;
    }

    let issues = tree.validate();
    let errors = issues.iter().filter(|i| i.is_error()).count();

    println!();
    println!("Layout Information:");
    println!("  File: {}", xml_path.display());
    println!("  Classes: {}", classes.len());
    println!("  Nodes: {}", tree.len());
    println!("  Total class size: {}", format_size(total_size));
    println!();
    println!("Member Kinds:");
    for (kind, count) in &kinds {
        println!("  {}: {}", kind, count);
    }
    println!();
    println!("Validation:");
    println!("  Errors: {}", errors);
    println!("  Warnings: {}", issues.len() - errors);

    Ok(())
}

/// List classes with optional filtering
pub fn list_classes(xml_path: &Path, filter: Option<&str>) -> Result<()> {
    let tree = open_tree(xml_path)?;
    let layout = tree.layout();
    let matcher = filter.map(create_glob_matcher).transpose()?;

    let mut count = 0u64;
    for index in tree.root_structs() {
        let node = &tree.nodes()[index];
        if !matches_filter(node.type_name(), matcher.as_ref()) {
            continue;
        }
        println!(
            "{:>8} {:>6} {}",
            format_offset(u64::from(layout.byte_size(index))),
            layout.children_of(node.id).len(),
            node.type_name()
        );
        count += 1;
    }

    println!();
    println!("Total: {} classes", count);
    Ok(())
}

/// Write C++ definitions for one class or for every class
pub fn write_header(xml_path: &Path, class: Option<&str>, output: Option<&Path>) -> Result<()> {
    let tree = open_tree(xml_path)?;
    let header = match class {
        Some(name) => {
            let index = find_class(&tree, name)?;
            render_cpp(&tree, tree.nodes()[index].id)?
        }
        None => render_cpp_all(&tree),
    };

    match output {
        Some(path) => {
            fs::write(path, &header)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", header),
    }
    Ok(())
}

/// Re-encode a ReClass XML file in normalised form
pub fn convert_file(input: &Path, output: &Path) -> Result<()> {
    println!("Converting {} -> {}", input.display(), output.display());
    let tree = open_tree(input)?;
    export_to_file(&tree, output, &ExportOptions::default())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} classes ({} nodes)",
        tree.root_structs().len(),
        tree.len()
    );
    Ok(())
}

/// Print structural issues. Returns `false` when any of them is an error.
pub fn validate_file(xml_path: &Path) -> Result<bool> {
    let tree = open_tree(xml_path)?;
    let issues = tree.validate();

    if issues.is_empty() {
        println!("No issues found");
        return Ok(true);
    }

    let mut ok = true;
    for issue in &issues {
        let level = if issue.is_error() {
            ok = false;
            "error"
        } else {
            "warning"
        };
        println!("{}: {}", level, issue);
    }
    println!();
    println!("Total: {} issues", issues.len());
    Ok(ok)
}

fn open_document(xml_path: &Path, binary: &Path, base: Option<u64>) -> Result<Document> {
    let mut doc = Document::from_reclass_xml(xml_path)
        .with_context(|| format!("Failed to open {}", xml_path.display()))?;
    if let Some(base) = base {
        doc.set_base(base);
    }
    doc.load_binary(binary)
        .with_context(|| format!("Failed to read {}", binary.display()))?;
    Ok(doc)
}

/// Print each member of a class with its address and current value
pub fn view_class(xml_path: &Path, binary: &Path, class: &str, base: Option<u64>) -> Result<()> {
    let doc = open_document(xml_path, binary, base)?;
    let tree = doc.tree();
    let layout = tree.layout();
    let index = find_class(tree, class)?;
    let root = &tree.nodes()[index];

    println!(
        "{} ({}) at {:#x}",
        root.type_name(),
        format_offset(u64::from(layout.byte_size(index))),
        tree.absolute_address(index)
    );
    for &member in layout.children_of(root.id) {
        let node = &tree.nodes()[member];
        let value = if node.kind.is_container() {
            node.type_name().to_string()
        } else {
            doc.read_value(node.id)?
        };
        println!(
            "  {:>8} {:#014x} {:<10} {:<20} {}",
            format_offset(u64::from(node.offset)),
            tree.absolute_address(member),
            node.kind.as_str(),
            node.name,
            value
        );
    }
    Ok(())
}

/// Write a value into a class member and save the patched binary
pub fn set_field(
    xml_path: &Path,
    binary: &Path,
    class: &str,
    field: &str,
    value: &str,
    output: Option<&Path>,
) -> Result<()> {
    let mut doc = open_document(xml_path, binary, None)?;
    let (id, kind) = {
        let tree = doc.tree();
        let index = find_class(tree, class)?;
        let root_id = tree.nodes()[index].id;
        let member = tree
            .children_of(root_id)
            .into_iter()
            .map(|i| &tree.nodes()[i])
            .find(|n| n.name == field)
            .ok_or_else(|| anyhow!("Field '{}' not found in {}", field, class))?;
        (member.id, member.kind)
    };
    if kind.is_container() {
        bail!("Field '{}' is a {} and has no scalar value", field, kind);
    }

    let before = doc.read_value(id)?;
    doc.set_node_value(id, value)
        .with_context(|| format!("Failed to set {}.{}", class, field))?;
    let after = doc.read_value(id)?;
    println!("{}.{}: {} -> {}", class, field, before, after);

    let provider = doc.provider();
    let data = provider.read_bytes(provider.base(), provider.size() as usize);
    let target = output.unwrap_or(binary);
    fs::write(target, data).with_context(|| format!("Failed to write {}", target.display()))?;
    println!("Wrote {}", target.display());
    Ok(())
}
