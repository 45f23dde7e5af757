//! ============================================================================
//! Knowledge Base - Document discovery and loading
//! ============================================================================
//! Scans the KB directory (priority) and the secondary documents directory
//! for supported files, extracts their text and hands them to the RAG
//! pipeline. When nothing is on disk a built-in sample document keeps the
//! assistant functional.
//! ============================================================================

pub mod chunker;
pub mod extract;

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::types::DocumentInfo;

/// A loaded document with its source metadata
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub content: String,
    pub filename: String,
    pub path: String,
    pub file_type: String,
    /// Origin: "kb", "documents" or "generated"
    pub directory: String,
}

/// Knowledge-base directories
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    kb_dir: PathBuf,
    documents_dir: PathBuf,
}

impl KnowledgeBase {
    pub fn new(kb_dir: impl Into<PathBuf>, documents_dir: impl Into<PathBuf>) -> Self {
        Self {
            kb_dir: kb_dir.into(),
            documents_dir: documents_dir.into(),
        }
    }

    pub fn kb_dir(&self) -> &Path {
        &self.kb_dir
    }

    pub fn documents_dir(&self) -> &Path {
        &self.documents_dir
    }

    /// Create both directories if they do not exist yet
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.kb_dir)?;
        std::fs::create_dir_all(&self.documents_dir)
    }

    /// Load every readable document. The KB directory wins; the documents
    /// directory is only consulted when the KB yields nothing, and the
    /// built-in sample is the last resort.
    pub fn load_documents(&self) -> Vec<SourceDocument> {
        let mut documents = load_from_dir(&self.kb_dir, "kb");
        if documents.is_empty() {
            documents = load_from_dir(&self.documents_dir, "documents");
        }
        if documents.is_empty() {
            warn!("No documents found on disk, ingesting the built-in sample");
            documents.push(sample_document());
        }
        documents
    }

    /// List every supported file in both directories (KB entries first),
    /// without reading their contents.
    pub fn list_files(&self) -> Vec<DocumentInfo> {
        let mut entries = list_dir(&self.kb_dir, "kb");
        entries.extend(list_dir(&self.documents_dir, "documents"));
        entries
    }
}

fn load_from_dir(dir: &Path, origin: &str) -> Vec<SourceDocument> {
    let mut documents = Vec::new();
    for path in walk_supported(dir) {
        match extract::extract_file(&path) {
            Ok(content) => documents.push(SourceDocument {
                content,
                filename: file_name(&path),
                path: path.display().to_string(),
                file_type: dotted_extension(&path),
                directory: origin.to_string(),
            }),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    documents
}

fn list_dir(dir: &Path, origin: &str) -> Vec<DocumentInfo> {
    walk_supported(dir)
        .into_iter()
        .filter_map(|path| {
            let size = std::fs::metadata(&path).ok()?.len();
            Some(DocumentInfo {
                name: file_name(&path),
                path: path.display().to_string(),
                size,
                file_type: dotted_extension(&path),
                source: origin.to_string(),
            })
        })
        .collect()
}

/// Recursively collect supported files under `dir`, sorted for stable output
fn walk_supported(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if extract::is_supported(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Built-in preventive-health content used when the knowledge base is empty
pub fn sample_document() -> SourceDocument {
    let content = "\
INFORMACIÓN SOBRE SALUD PREVENTIVA Y BIENESTAR

1. FACTORES DE RIESGO CARDIOMETABÓLICO:
- Edad avanzada aumenta el riesgo
- Índice de masa corporal (BMI) elevado (>25) es un factor de riesgo
- Presión arterial alta (>130/80) aumenta el riesgo cardiovascular
- Niveles elevados de glucosa o hemoglobina A1c indican riesgo de diabetes
- Circunferencia de cintura elevada está asociada con riesgo metabólico

2. RECOMENDACIONES PREVENTIVAS:
- Mantener un peso saludable (BMI entre 18.5 y 24.9)
- Realizar actividad física regular (al menos 150 minutos semanales)
- Seguir una dieta balanceada rica en frutas y verduras
- Limitar el consumo de azúcares y grasas saturadas
- Dormir entre 7-9 horas por noche
- Evitar el tabaquismo
- Controlar el estrés

3. IMPORTANTE:
- Estas recomendaciones son de carácter preventivo y educativo
- Siempre consulta con un profesional de salud para diagnósticos
- Si experimentas síntomas graves, busca atención médica inmediata
";

    SourceDocument {
        content: content.to_string(),
        filename: "sample_kb.txt".to_string(),
        path: "sample_kb".to_string(),
        file_type: ".txt".to_string(),
        directory: "generated".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_kb_directory_has_priority() {
        let kb = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        write_file(kb.path(), "guia.txt", "Contenido de la guía.");
        write_file(docs.path(), "otro.txt", "Contenido secundario.");

        let base = KnowledgeBase::new(kb.path(), docs.path());
        let documents = base.load_documents();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "guia.txt");
        assert_eq!(documents[0].directory, "kb");
    }

    #[test]
    fn test_falls_back_to_documents_dir() {
        let kb = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        write_file(docs.path(), "otro.txt", "Contenido secundario.");

        let base = KnowledgeBase::new(kb.path(), docs.path());
        let documents = base.load_documents();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].directory, "documents");
    }

    #[test]
    fn test_sample_when_everything_empty() {
        let kb = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();

        let base = KnowledgeBase::new(kb.path(), docs.path());
        let documents = base.load_documents();

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].directory, "generated");
        assert!(documents[0].content.contains("FACTORES DE RIESGO"));
    }

    #[test]
    fn test_unsupported_files_ignored() {
        let kb = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        write_file(kb.path(), "datos.csv", "a,b,c");
        write_file(kb.path(), "guia.txt", "Texto válido.");

        let base = KnowledgeBase::new(kb.path(), docs.path());
        let documents = base.load_documents();
        assert_eq!(documents.len(), 1);

        let listing = base.list_files();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].file_type, ".txt");
    }

    #[test]
    fn test_list_files_both_directories() {
        let kb = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        write_file(kb.path(), "guia.txt", "Texto.");
        write_file(docs.path(), "extra.svg", "<svg><text>riesgo</text></svg>");

        let base = KnowledgeBase::new(kb.path(), docs.path());
        let listing = base.list_files();

        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].source, "kb");
        assert_eq!(listing[1].source, "documents");
        assert!(listing[1].size > 0);
    }

    #[test]
    fn test_recursive_scan() {
        let kb = tempfile::tempdir().unwrap();
        let nested = kb.path().join("sub");
        std::fs::create_dir_all(&nested).unwrap();
        write_file(&nested, "anidado.txt", "Texto anidado.");

        let base = KnowledgeBase::new(kb.path(), kb.path().join("missing"));
        let documents = base.load_documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].filename, "anidado.txt");
    }
}
