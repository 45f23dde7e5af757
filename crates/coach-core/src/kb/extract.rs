//! ============================================================================
//! Document Extraction - Plain text from .txt and .svg files
//! ============================================================================
//! SVG extraction pulls everything a human could read out of the markup:
//! `<text>`/`<tspan>`/`<desc>`/`<metadata>` contents, `title`/`aria-label`
//! attribute values and `data-*` attributes. When nothing matches, the file
//! is flattened by stripping all tags.
//! ============================================================================

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use thiserror::Error;

/// Extensions the knowledge base accepts (lowercase, without dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "svg"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("unsupported file format: {0}. Supported: .txt, .svg")]
    UnsupportedFormat(String),
    #[error("no extractable text in {0}")]
    EmptyDocument(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

static TEXT_ELEMENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:text|tspan|desc)\b[^>]*>([^<]+)").unwrap());
static METADATA_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<metadata\b[^>]*>(.*?)</metadata>").unwrap());
static LABEL_ATTRIBUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:\btitle|aria-label)\s*=\s*"([^"]+)""#).unwrap());
static DATA_ATTRIBUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\b(data-[A-Za-z0-9_-]+)\s*=\s*"([^"]*)""#).unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// True when the file extension is one the knowledge base can process
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract the text content of a knowledge-base file
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default();

    let raw = std::fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let content = match extension.as_str() {
        "svg" => extract_svg_text(&raw),
        "txt" => raw,
        other => return Err(ExtractError::UnsupportedFormat(format!(".{}", other))),
    };

    if content.trim().is_empty() {
        return Err(ExtractError::EmptyDocument(path.display().to_string()));
    }
    Ok(content)
}

/// Pull human-readable text out of SVG markup
pub fn extract_svg_text(svg: &str) -> String {
    let mut fragments: Vec<String> = Vec::new();

    for capture in TEXT_ELEMENTS.captures_iter(svg) {
        push_trimmed(&mut fragments, &capture[1]);
    }

    for capture in METADATA_ELEMENT.captures_iter(svg) {
        let inner = ANY_TAG.replace_all(&capture[1], " ");
        push_trimmed(&mut fragments, &inner);
    }

    for capture in LABEL_ATTRIBUTES.captures_iter(svg) {
        let value = capture[1].trim();
        if !value.is_empty() {
            fragments.push(format!("Título: {}", value));
        }
    }

    for capture in DATA_ATTRIBUTES.captures_iter(svg) {
        let value = capture[2].trim();
        if !value.is_empty() {
            fragments.push(format!("{}: {}", &capture[1], value));
        }
    }

    if fragments.is_empty() {
        // Last resort: strip every tag and collapse whitespace.
        let stripped = ANY_TAG.replace_all(svg, " ");
        let collapsed = WHITESPACE.replace_all(stripped.trim(), " ");
        return collapsed.to_string();
    }

    fragments.join("\n")
}

fn push_trimmed(fragments: &mut Vec<String>, value: &str) {
    let collapsed = WHITESPACE.replace_all(value.trim(), " ");
    if !collapsed.is_empty() {
        fragments.push(collapsed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_supported() {
        assert!(is_supported(Path::new("guia.txt")));
        assert!(is_supported(Path::new("grafico.SVG")));
        assert!(!is_supported(Path::new("datos.csv")));
        assert!(!is_supported(Path::new("sin_extension")));
    }

    #[test]
    fn test_svg_text_elements() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <text x="0" y="10">Presión arterial</text>
            <text><tspan>Valor normal: 120/80</tspan></text>
            <desc>Gráfico de factores de riesgo</desc>
        </svg>"#;
        let text = extract_svg_text(svg);
        assert!(text.contains("Presión arterial"));
        assert!(text.contains("Valor normal: 120/80"));
        assert!(text.contains("Gráfico de factores de riesgo"));
    }

    #[test]
    fn test_svg_attributes() {
        let svg = r#"<svg><rect title="Zona de riesgo" data-umbral="0.6"/></svg>"#;
        let text = extract_svg_text(svg);
        assert!(text.contains("Título: Zona de riesgo"));
        assert!(text.contains("data-umbral: 0.6"));
    }

    #[test]
    fn test_svg_fallback_strips_tags() {
        let svg = "<svg><g>riesgo cardiometabólico</g></svg>";
        // `<g>` is not a text element, so the fallback path handles it.
        assert_eq!(extract_svg_text(svg), "riesgo cardiometabólico");
    }

    #[test]
    fn test_extract_txt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guia.txt");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Dormir entre 7 y 9 horas por noche.").unwrap();

        let content = extract_file(&path).unwrap();
        assert!(content.contains("7 y 9 horas"));
    }

    #[test]
    fn test_extract_missing_file() {
        let result = extract_file(Path::new("/nonexistent/guia.txt"));
        assert!(matches!(result, Err(ExtractError::NotFound(_))));
    }

    #[test]
    fn test_extract_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("datos.csv");
        std::fs::write(&path, "a,b,c").unwrap();

        let result = extract_file(&path);
        assert!(matches!(result, Err(ExtractError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_extract_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vacio.txt");
        std::fs::write(&path, "   \n  ").unwrap();

        let result = extract_file(&path);
        assert!(matches!(result, Err(ExtractError::EmptyDocument(_))));
    }
}
