use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use roxmltree::{Document, Node, ParsingOptions};
use thiserror::Error;

use crate::model::{DiagnosisEntry, IncompleteEntry};

pub const TABULAR_ROOT: &str = "ICD10CM.tabular";
pub const INDEX_ROOT: &str = "ICD10CM.index";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path} as {encoding}")]
    Encoding { path: PathBuf, encoding: String },
    #[error("malformed XML: {0}")]
    Parse(#[from] roxmltree::Error),
}

/// Shape of an ICD XML file as recognised from its root element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Tabular,
    Index,
    Generic,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Tabular => TABULAR_ROOT,
            DocumentKind::Index => INDEX_ROOT,
            DocumentKind::Generic => "tabular",
        }
    }
}

/// Read an XML file into UTF-8 text.
///
/// A byte order mark wins, then the `encoding` of the XML declaration, then
/// UTF-8. Undecodable bytes and unknown encoding labels are errors.
pub fn read_source(path: &Path) -> Result<String, DocumentError> {
    let bytes = fs::read(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_source(&bytes).map_err(|encoding| DocumentError::Encoding {
        path: path.to_path_buf(),
        encoding,
    })
}

fn decode_source(bytes: &[u8]) -> Result<String, String> {
    let (encoding, body) = match Encoding::for_bom(bytes) {
        Some((encoding, bom_len)) => (encoding, &bytes[bom_len..]),
        None => {
            let encoding = match declared_encoding(bytes) {
                Some(label) => {
                    Encoding::for_label(label.as_bytes()).ok_or_else(|| label.to_string())?
                }
                None => UTF_8,
            };
            (encoding, bytes)
        }
    };
    let (text, had_errors) = encoding.decode_without_bom_handling(body);
    if had_errors {
        return Err(encoding.name().to_string());
    }
    Ok(text.into_owned())
}

/// `encoding` pseudo-attribute of a leading `<?xml ... ?>` declaration.
fn declared_encoding(bytes: &[u8]) -> Option<&str> {
    let rest = bytes.strip_prefix(b"<?xml")?;
    let end = rest.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&rest[..end]).ok()?;
    let after = &decl[decl.find("encoding")? + "encoding".len()..];
    let value = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = value.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &value[1..];
    Some(&value[..value.find(quote)?])
}

/// A parsed chapter → section → diag document.
pub struct IcdDocument<'input> {
    doc: Document<'input>,
}

impl<'input> IcdDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, DocumentError> {
        let opts = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, opts)?;
        Ok(Self { doc })
    }

    pub fn root_tag(&self) -> &str {
        self.doc.root_element().tag_name().name()
    }

    pub fn kind(&self) -> DocumentKind {
        match self.root_tag() {
            TABULAR_ROOT => DocumentKind::Tabular,
            INDEX_ROOT => DocumentKind::Index,
            _ => DocumentKind::Generic,
        }
    }

    pub fn has_chapters(&self) -> bool {
        self.chapters().next().is_some()
    }

    /// Chapters anywhere below the root element, in document order.
    pub fn chapters(&self) -> impl Iterator<Item = Chapter<'_, 'input>> + '_ {
        descendants_named(self.doc.root_element(), "chapter").map(|node| Chapter { node })
    }
}

#[derive(Clone, Copy)]
pub struct Chapter<'a, 'input> {
    node: Node<'a, 'input>,
}

impl<'a, 'input> Chapter<'a, 'input> {
    /// Text of the chapter's own `desc` child, empty when absent.
    pub fn label(&self) -> &'a str {
        child_text(self.node, "desc").unwrap_or("")
    }

    /// Every `diag` under every `section` of this chapter, validated.
    ///
    /// Sections and diags are matched at any depth, so a diag below nested
    /// sections is yielded once per enclosing section.
    pub fn entries(&self) -> Vec<Result<DiagnosisEntry, IncompleteEntry>> {
        let label = self.label();
        descendants_named(self.node, "section")
            .flat_map(|section| descendants_named(section, "diag"))
            .map(|diag| DiagnosisEntry::new(child_text(diag, "name"), child_text(diag, "desc"), label))
            .collect()
    }
}

fn descendants_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |n| n.is_element() && n.tag_name().name() == name)
}

/// Leading text of the first direct child called `name`. A present but empty
/// child yields `Some("")`.
fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
        .map(|c| c.text().unwrap_or(""))
}
