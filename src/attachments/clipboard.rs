//! Clipboard paste surface backed by the `arboard` crate.
//!
//! A fresh [`arboard::Clipboard`] handle is opened for every paste rather
//! than shared, because the handle is not `Send` on all platforms and is
//! cheap to create.

use std::io::Cursor;

use arboard::Clipboard;
use thiserror::Error;

use super::source::{parse_dropped_paths, DataUrlFile, MemoryFile, PathFile, RawFile};

/// Name given to images pasted from the clipboard.
pub const PASTED_IMAGE_NAME: &str = "pasted-image.png";

/// Errors raised while reading the clipboard.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("failed to access the clipboard: {0}")]
    Access(String),

    #[error("clipboard image has inconsistent dimensions ({width}x{height}, {len} bytes)")]
    BadImage {
        width: usize,
        height: usize,
        len: usize,
    },

    #[error("failed to encode clipboard image as PNG: {0}")]
    Encode(#[from] image::ImageError),
}

/// Read whatever the clipboard holds as attachment candidates.
///
/// * An image becomes a single PNG [`MemoryFile`].
/// * Text holding a `data:` URL becomes a [`DataUrlFile`].
/// * Other text is treated as a list of file paths (copied files in most
///   file managers paste as paths or `file://` URIs).
///
/// Returns an empty list when the clipboard is empty.  Whether the result
/// contains images is left to the attachment pipeline.
pub fn read_files() -> Result<Vec<Box<dyn RawFile>>, ClipboardError> {
    let mut clipboard = open_clipboard()?;

    if let Ok(img) = clipboard.get_image() {
        let png = encode_png(img.width, img.height, img.bytes.into_owned())?;
        log::debug!("clipboard: pasted image, {} PNG bytes", png.len());
        let file = MemoryFile::new(Some(PASTED_IMAGE_NAME.to_string()), "image/png", png);
        return Ok(vec![Box::new(file)]);
    }

    // `get_text` errors when the clipboard is empty or holds no text.
    let Ok(text) = clipboard.get_text() else {
        return Ok(Vec::new());
    };
    Ok(files_from_text(&text))
}

/// Interpret pasted text as attachment candidates.
pub fn files_from_text(text: &str) -> Vec<Box<dyn RawFile>> {
    if let Some(file) = DataUrlFile::parse(text) {
        return vec![Box::new(file)];
    }
    parse_dropped_paths(text)
        .into_iter()
        .map(|p| Box::new(PathFile::new(p)) as Box<dyn RawFile>)
        .collect()
}

/// Encode a tightly packed RGBA8 image as PNG.
pub fn encode_png(width: usize, height: usize, rgba: Vec<u8>) -> Result<Vec<u8>, ClipboardError> {
    let len = rgba.len();
    let bad = || ClipboardError::BadImage { width, height, len };

    let w = u32::try_from(width).map_err(|_| bad())?;
    let h = u32::try_from(height).map_err(|_| bad())?;
    let img = image::RgbaImage::from_raw(w, h, rgba).ok_or_else(bad)?;

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn open_clipboard() -> Result<Clipboard, ClipboardError> {
    Clipboard::new().map_err(|e| ClipboardError::Access(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_rgba_as_png() {
        let png = encode_png(2, 1, vec![255, 0, 0, 255, 0, 255, 0, 255]).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn rejects_short_pixel_buffer() {
        let err = encode_png(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, ClipboardError::BadImage { len: 10, .. }));
    }

    #[test]
    fn text_with_data_url_becomes_single_file() {
        let files = files_from_text("data:image/jpeg;base64,/9j/");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].declared_type(), "image/jpeg");
    }

    #[test]
    fn text_with_paths_becomes_path_files() {
        let files = files_from_text("/tmp/a.png /tmp/b.txt");
        let types: Vec<_> = files.iter().map(|f| f.declared_type()).collect();
        assert_eq!(types, vec!["image/png", "text/plain"]);
    }
}
