//! Raw file sources feeding the attachment pipeline.
//!
//! Every input surface (file picker, clipboard paste, drag-and-drop) hands
//! the pipeline a `Box<dyn RawFile>`.  The pipeline only looks at the
//! declared MIME type and, once a file is accepted, reads its bytes.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use url::Url;

use super::payload::{decode_payload, split_data_url};

/// MIME type used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

// ---------------------------------------------------------------------------
// InputSurface
// ---------------------------------------------------------------------------

/// Where a batch of files came from.  Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSurface {
    Picker,
    Clipboard,
    Drop,
}

impl fmt::Display for InputSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputSurface::Picker => "picker",
            InputSurface::Clipboard => "clipboard",
            InputSurface::Drop => "drop",
        })
    }
}

// ---------------------------------------------------------------------------
// RawFile trait
// ---------------------------------------------------------------------------

/// A file offered for attachment, before validation.
///
/// Implementors must be `Send + Sync` so the read can run on a spawned task.
#[async_trait]
pub trait RawFile: Send + Sync {
    /// Original file name, if the source has one.
    fn name(&self) -> Option<&str>;

    /// MIME type declared by the source (not sniffed from content).
    fn declared_type(&self) -> &str;

    /// Size in bytes when known before reading.
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Opaque handle a renderer can use to show a preview.
    fn preview(&self) -> Option<String> {
        None
    }

    /// Read the complete binary content.
    async fn read(&self) -> std::io::Result<Vec<u8>>;
}

/// `true` when a declared type names an image.
pub fn is_image_type(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

// ---------------------------------------------------------------------------
// PathFile
// ---------------------------------------------------------------------------

/// A file on disk, as chosen in the picker or dropped onto the terminal.
#[derive(Debug, Clone)]
pub struct PathFile {
    path: PathBuf,
    name: Option<String>,
    mime: &'static str,
    size: Option<u64>,
}

impl PathFile {
    /// Wrap `path`.  The declared type comes from the extension; the size is
    /// taken from filesystem metadata when available.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        let mime = mime_for_path(&path);
        let size = std::fs::metadata(&path).ok().map(|m| m.len());
        Self {
            path,
            name,
            mime,
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RawFile for PathFile {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn declared_type(&self) -> &str {
        self.mime
    }

    fn size_hint(&self) -> Option<u64> {
        self.size
    }

    fn preview(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }

    async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// Map a file extension to the MIME type a browser would declare.
///
/// Image extensions the MIME table does not know yet fall back to the
/// image decoder's own extension list.
pub fn mime_for_path(path: &Path) -> &'static str {
    if let Some(mime) = mime_guess::from_path(path).first_raw() {
        return mime;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(image::ImageFormat::from_extension)
        .map(|format| format.to_mime_type())
        .unwrap_or(OCTET_STREAM)
}

// ---------------------------------------------------------------------------
// MemoryFile
// ---------------------------------------------------------------------------

/// Bytes already in memory (clipboard images, tests).
#[derive(Debug, Clone)]
pub struct MemoryFile {
    name: Option<String>,
    mime: String,
    bytes: Vec<u8>,
}

impl MemoryFile {
    pub fn new(name: Option<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name,
            mime: mime.into(),
            bytes,
        }
    }
}

#[async_trait]
impl RawFile for MemoryFile {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn declared_type(&self) -> &str {
        &self.mime
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    async fn read(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}

// ---------------------------------------------------------------------------
// DataUrlFile
// ---------------------------------------------------------------------------

/// A pasted `data:<mime>;base64,<payload>` URL.
///
/// The payload is decoded lazily in [`RawFile::read`], so a malformed
/// payload surfaces as a read failure of that one file.
#[derive(Debug, Clone)]
pub struct DataUrlFile {
    mime: String,
    data: String,
}

impl DataUrlFile {
    /// Parse `url`; `None` when it is not a base64 data URL.
    pub fn parse(url: &str) -> Option<Self> {
        let (mime, data) = split_data_url(url.trim())?;
        Some(Self {
            mime: mime.to_string(),
            data: data.to_string(),
        })
    }
}

#[async_trait]
impl RawFile for DataUrlFile {
    fn name(&self) -> Option<&str> {
        None
    }

    fn declared_type(&self) -> &str {
        &self.mime
    }

    /// Decoded size, computed from the base64 length and padding.
    fn size_hint(&self) -> Option<u64> {
        let data = self.data.trim();
        let padding = data.bytes().rev().take_while(|&b| b == b'=').count();
        Some((data.len() * 3 / 4).saturating_sub(padding) as u64)
    }

    async fn read(&self) -> std::io::Result<Vec<u8>> {
        decode_payload(&self.data)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

// ---------------------------------------------------------------------------
// Drag-and-drop parsing
// ---------------------------------------------------------------------------

/// Split the text a terminal pastes when files are dropped onto it.
///
/// Handles single/double quoting (GNOME, Windows Terminal), backslash
/// escaped spaces (macOS Terminal, iTerm2) and `file://` URIs with
/// percent-encoding (KDE, some X11 file managers).
///
/// ```
/// use gemini_chat::attachments::parse_dropped_paths;
/// use std::path::PathBuf;
///
/// let paths = parse_dropped_paths(r"'/tmp/a b.png' /tmp/c\ d.jpg");
/// assert_eq!(paths, vec![PathBuf::from("/tmp/a b.png"), PathBuf::from("/tmp/c d.jpg")]);
/// ```
pub fn parse_dropped_paths(input: &str) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            // Escapes only a following space or quote; any other backslash
            // is a Windows path separator.
            (None, '\\') => {
                match chars.peek() {
                    Some(&next) if next.is_whitespace() || next == '\'' || next == '"' => {
                        current.push(next);
                        chars.next();
                    }
                    _ => current.push('\\'),
                }
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    out.push(finish_dropped_token(&current));
                    current.clear();
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        out.push(finish_dropped_token(&current));
    }
    out
}

fn finish_dropped_token(token: &str) -> PathBuf {
    if token.starts_with("file:") {
        match Url::parse(token).map(|url| url.to_file_path()) {
            Ok(Ok(path)) => return path,
            _ => log::debug!("dropped URI {token:?} is not a local file path"),
        }
    }
    PathBuf::from(token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_type_check_is_prefix_based() {
        assert!(is_image_type("image/png"));
        assert!(is_image_type("IMAGE/JPEG"));
        assert!(!is_image_type("text/plain"));
        assert!(!is_image_type(""));
        assert!(!is_image_type("application/image"));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(mime_for_path(Path::new("Makefile")), OCTET_STREAM);
    }

    #[test]
    fn uncommon_image_extensions_are_images() {
        assert_eq!(mime_for_path(Path::new("x.jpe")), "image/jpeg");
        assert!(is_image_type(mime_for_path(Path::new("x.apng"))));
    }

    #[test]
    fn dropped_paths_with_quotes_escapes_and_uris() {
        let got = parse_dropped_paths(
            "\"/x/one two.gif\"  file:///home/me/My%20Pics/cat.webp /plain.png",
        );
        assert_eq!(
            got,
            vec![
                PathBuf::from("/x/one two.gif"),
                PathBuf::from("/home/me/My Pics/cat.webp"),
                PathBuf::from("/plain.png"),
            ]
        );
    }

    #[test]
    fn dropped_paths_empty_input() {
        assert!(parse_dropped_paths("   ").is_empty());
    }

    #[test]
    fn localhost_file_uri_is_absolute() {
        assert_eq!(
            parse_dropped_paths("file://localhost/tmp/x.png"),
            vec![PathBuf::from("/tmp/x.png")]
        );
    }

    #[test]
    fn backslash_only_escapes_spaces_and_quotes() {
        assert_eq!(
            parse_dropped_paths(r"C:\Users\me\cat.png /tmp/it\'s.png"),
            vec![
                PathBuf::from(r"C:\Users\me\cat.png"),
                PathBuf::from("/tmp/it's.png"),
            ]
        );
    }

    #[tokio::test]
    async fn data_url_file_reads_decoded_bytes() {
        let file = DataUrlFile::parse("data:image/png;base64,iVBORw==").unwrap();
        assert_eq!(file.declared_type(), "image/png");
        assert_eq!(file.size_hint(), Some(4));
        assert_eq!(file.read().await.unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn data_url_file_with_bad_payload_fails_on_read() {
        let file = DataUrlFile::parse("data:image/png;base64,@@@").unwrap();
        assert!(file.read().await.is_err());
    }

    #[tokio::test]
    async fn path_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.png");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let file = PathFile::new(&path);
        assert_eq!(file.name(), Some("pixel.png"));
        assert_eq!(file.declared_type(), "image/png");
        assert_eq!(file.size_hint(), Some(3));
        assert_eq!(file.read().await.unwrap(), vec![1, 2, 3]);
    }
}
