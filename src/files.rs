//! File store collaborator and submission previews.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FileError;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9._ -]").unwrap();
}

/// Stores uploaded artifacts and hands back a public link.
pub trait FileStore: Send + Sync {
    /// Store `bytes` as `filename` under `destination` ("a/b/c"), returning its link.
    /// An existing file is never overwritten.
    fn upload(&self, bytes: &[u8], filename: &str, destination: &str) -> Result<String, FileError>;

    /// Fetch the bytes behind a link returned by [`FileStore::upload`].
    fn download(&self, link: &str) -> Result<Vec<u8>, FileError>;

    /// Delete the file behind a link returned by [`FileStore::upload`].
    fn remove(&self, link: &str) -> Result<(), FileError>;
}

impl<F: FileStore + ?Sized> FileStore for std::sync::Arc<F> {
    fn upload(&self, bytes: &[u8], filename: &str, destination: &str) -> Result<String, FileError> {
        (**self).upload(bytes, filename, destination)
    }

    fn download(&self, link: &str) -> Result<Vec<u8>, FileError> {
        (**self).download(link)
    }

    fn remove(&self, link: &str) -> Result<(), FileError> {
        (**self).remove(link)
    }
}

/// Files kept in a local directory and served under `<base_url>/files/`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        LocalFileStore {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prefix(&self) -> String {
        format!("{}/files/", self.base_url)
    }

    /// On-disk path behind `link`. Every segment must be one that
    /// [`safe_segment`] could have produced.
    fn resolve(&self, link: &str) -> Result<PathBuf, FileError> {
        let foreign = || FileError::ForeignLink(link.to_string());
        let relative = link.strip_prefix(&self.prefix()).ok_or_else(foreign)?;

        let mut path = self.root.clone();
        for segment in relative.split('/') {
            let on_disk = urlencoding::decode(segment).map_err(|_| foreign())?;
            if !is_safe_segment(&on_disk) {
                return Err(foreign());
            }
            path.push(on_disk.as_ref());
        }
        Ok(path)
    }
}

/// Make one path segment safe to use on disk. Characters outside
/// `[A-Za-z0-9._ -]`, `%` included, are percent-encoded, so distinct names
/// never share a path.
pub fn safe_segment(segment: &str) -> Result<String, FileError> {
    let trimmed = segment.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return Err(FileError::InvalidName(segment.to_string()));
    }
    Ok(UNSAFE_CHARS
        .replace_all(trimmed, |caps: &regex::Captures| {
            caps[0]
                .bytes()
                .map(|b| format!("%{:02X}", b))
                .collect::<String>()
        })
        .into_owned())
}

fn is_safe_segment(candidate: &str) -> bool {
    urlencoding::decode(candidate)
        .ok()
        .and_then(|name| safe_segment(&name).ok())
        .is_some_and(|encoded| encoded == candidate)
}

impl FileStore for LocalFileStore {
    fn upload(&self, bytes: &[u8], filename: &str, destination: &str) -> Result<String, FileError> {
        let mut segments = destination
            .split('/')
            .filter(|s| !s.trim().is_empty())
            .map(safe_segment)
            .collect::<Result<Vec<_>, _>>()?;
        segments.push(safe_segment(filename)?);

        let encoded: Vec<String> = segments
            .iter()
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        let link = format!("{}{}", self.prefix(), encoded.join("/"));

        let path = segments.iter().fold(self.root.clone(), |p, s| p.join(s));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(FileError::Exists(link));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        Ok(link)
    }

    fn download(&self, link: &str) -> Result<Vec<u8>, FileError> {
        match fs::read(self.resolve(link)?) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileError::NotFound(link.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, link: &str) -> Result<(), FileError> {
        match fs::remove_file(self.resolve(link)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FileError::NotFound(link.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Lowercased extension of a file name, empty if there is none.
pub fn extension(file_name: &str) -> String {
    Path::new(file_name.trim())
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// How a submitted file can be shown to a grader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Pdf,
    OfficeDocument,
    Notebook,
    PythonSource,
    Image,
    Unsupported,
}

pub fn preview_kind(file_name: &str) -> PreviewKind {
    match extension(file_name).as_str() {
        "pdf" => PreviewKind::Pdf,
        "doc" | "docx" | "ppt" | "pptx" | "xls" | "xlsx" => PreviewKind::OfficeDocument,
        "ipynb" => PreviewKind::Notebook,
        "py" => PreviewKind::PythonSource,
        "png" | "jpg" | "jpeg" | "gif" => PreviewKind::Image,
        _ => PreviewKind::Unsupported,
    }
}

/// One rendered notebook cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "source", rename_all = "lowercase")]
pub enum NotebookCell {
    Markdown(String),
    Code(String),
}

#[derive(Deserialize)]
struct RawNotebook {
    #[serde(default)]
    cells: Vec<RawCell>,
}

#[derive(Deserialize)]
struct RawCell {
    cell_type: String,
    #[serde(default)]
    source: RawSource,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for RawSource {
    fn default() -> Self {
        RawSource::Text(String::new())
    }
}

impl RawSource {
    fn joined(self) -> String {
        match self {
            RawSource::Lines(lines) => lines.concat(),
            RawSource::Text(text) => text,
        }
    }
}

/// Markdown and code cells of a Jupyter notebook, in order. Raw cells are dropped.
pub fn render_notebook(bytes: &[u8]) -> Result<Vec<NotebookCell>, FileError> {
    let notebook: RawNotebook = serde_json::from_slice(bytes)?;
    Ok(notebook
        .cells
        .into_iter()
        .filter_map(|cell| match cell.cell_type.as_str() {
            "markdown" => Some(NotebookCell::Markdown(cell.source.joined())),
            "code" => Some(NotebookCell::Code(cell.source.joined())),
            _ => None,
        })
        .collect())
}

/// What a grader sees for one submitted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    pub kind: PreviewKind,
    pub link: String,

    /// Source text, for Python files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Rendered cells, for notebooks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cells: Option<Vec<NotebookCell>>,
}

/// Build the preview of `file_name` stored at `link`. Only notebooks and
/// Python sources are downloaded; everything else is shown through its link.
pub fn build_preview(files: &dyn FileStore, file_name: &str, link: &str) -> Result<Preview, FileError> {
    let kind = preview_kind(file_name);
    let mut preview = Preview {
        kind,
        link: link.to_string(),
        text: None,
        cells: None,
    };
    match kind {
        PreviewKind::Notebook => preview.cells = Some(render_notebook(&files.download(link)?)?),
        PreviewKind::PythonSource => {
            preview.text = Some(String::from_utf8_lossy(&files.download(link)?).into_owned())
        }
        _ => {}
    }
    Ok(preview)
}
