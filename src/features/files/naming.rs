//! Object path, MIME type and download framing derived from a filename.

/// Content type recorded when the extension is unknown
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension of the last path element, dot included, original case kept.
///
/// `"archive.tar.gz"` gives `".gz"`, `"notes"` gives `""`.
pub fn extension(filename: &str) -> &str {
    match filename.rfind(['.', '/']) {
        Some(i) if filename[i..].starts_with('.') => &filename[i..],
        _ => "",
    }
}

/// Slugified stem followed by the untouched extension
pub fn slug_from_filename(filename: &str) -> String {
    let ext = extension(filename);
    let stem = &filename[..filename.len() - ext.len()];
    format!("{}{}", slug::slugify(stem), ext)
}

/// `{owner_id}/{slug}{ext}`; deterministic but not injective.
///
/// `None` when neither the stem nor the extension leaves anything behind,
/// e.g. `"!!!"`, which would otherwise map to the bare prefix `"{owner_id}/"`.
pub fn make_object_path(owner_id: i64, filename: &str) -> Option<String> {
    let slug = slug_from_filename(filename);
    if slug.trim_start_matches('.').is_empty() {
        return None;
    }
    Some(format!("{}/{}", owner_id, slug))
}

pub fn mime_type_for(filename: &str) -> String {
    let ext = extension(filename).trim_start_matches('.');
    mime_guess::from_ext(ext)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Images render in the browser; everything else is offered as a download
/// under its original name.
pub fn content_disposition(mime_type: &str, filename: &str) -> String {
    if mime_type.starts_with("image/") {
        return "inline".to_string();
    }

    let mut quoted = String::with_capacity(filename.len());
    for c in filename.chars() {
        match c {
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            c if c.is_control() => {}
            c => quoted.push(c),
        }
    }

    format!("attachment; filename=\"{}\"", quoted)
}
