// SPDX-License-Identifier: MIT OR Apache-2.0
//! Model file import: allow-list, size ceiling, structural sniffing.

use pipeline_editor_graph::payload::{ModelAsset, ModelFormat};
use pipeline_editor_graph::services::{file_name_of, ImportError, ModelImporter, MAX_MODEL_BYTES};
use std::path::Path;
use uuid::Uuid;

const GLB_MAGIC: &[u8; 4] = b"glTF";
const STL_HEADER_LEN: usize = 80;
const STL_TRIANGLE_LEN: usize = 50;

/// Importer for `.glb`, `.gltf`, `.obj` and `.stl` files
#[derive(Debug, Clone)]
pub struct FileModelImporter {
    max_bytes: usize,
}

impl FileModelImporter {
    /// Importer with a custom size ceiling
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    fn check_size(&self, size: usize) -> Result<(), ImportError> {
        if size > self.max_bytes {
            return Err(ImportError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

impl Default for FileModelImporter {
    fn default() -> Self {
        Self::new(MAX_MODEL_BYTES)
    }
}

impl ModelImporter for FileModelImporter {
    fn import(&self, file_name: &str, bytes: Vec<u8>) -> Result<ModelAsset, ImportError> {
        let format = format_of(file_name)?;
        self.check_size(bytes.len())?;

        let vertex_count = match format {
            ModelFormat::Glb => sniff_glb(&bytes)?,
            ModelFormat::Gltf => sniff_gltf(&bytes)?,
            ModelFormat::Obj => sniff_obj(&bytes)?,
            ModelFormat::Stl => sniff_stl(&bytes)?,
        };

        tracing::info!(file = file_name, ?format, size = bytes.len(), ?vertex_count, "Imported model");
        Ok(ModelAsset {
            id: Uuid::new_v4(),
            name: file_name.to_string(),
            format,
            bytes: bytes.into(),
            vertex_count,
        })
    }

    /// Extension and size are checked before any byte is read
    fn import_path(&self, path: &Path) -> Result<ModelAsset, ImportError> {
        let name = file_name_of(path);
        format_of(&name)?;

        let unreadable = |err: std::io::Error| ImportError::Unreadable(format!("{}: {err}", path.display()));
        let size = std::fs::metadata(path).map_err(unreadable)?.len();
        self.check_size(usize::try_from(size).unwrap_or(usize::MAX))?;

        let bytes = std::fs::read(path).map_err(unreadable)?;
        self.import(&name, bytes)
    }
}


fn format_of(file_name: &str) -> Result<ModelFormat, ImportError> {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    ModelFormat::from_extension(&ext).ok_or_else(|| {
        if ext.is_empty() {
            ImportError::UnsupportedFileType(file_name.to_string())
        } else {
            ImportError::UnsupportedFileType(format!(".{ext}"))
        }
    })
}

fn parse_failure(what: &str) -> ImportError {
    ImportError::ParseFailure(what.to_string())
}

fn sniff_glb(bytes: &[u8]) -> Result<Option<usize>, ImportError> {
    if bytes.len() < 12 || &bytes[..4] != GLB_MAGIC {
        return Err(parse_failure("missing GLB header"));
    }
    let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    if declared > bytes.len() {
        return Err(parse_failure("GLB length exceeds file size"));
    }
    Ok(None)
}

fn sniff_gltf(bytes: &[u8]) -> Result<Option<usize>, ImportError> {
    let document: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|err| ImportError::ParseFailure(format!("invalid glTF JSON: {err}")))?;
    if !document.get("asset").is_some_and(serde_json::Value::is_object) {
        return Err(parse_failure("glTF document has no asset object"));
    }

    // Sum POSITION accessor counts when the document is self-describing
    let accessors = document.get("accessors").and_then(serde_json::Value::as_array);
    let count = document
        .get("meshes")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|mesh| mesh.get("primitives")?.as_array())
        .flatten()
        .filter_map(|primitive| primitive.get("attributes")?.get("POSITION")?.as_u64())
        .filter_map(|index| accessors?.get(usize::try_from(index).ok()?)?.get("count")?.as_u64())
        .sum::<u64>();
    Ok((count > 0).then_some(count as usize))
}

fn sniff_obj(bytes: &[u8]) -> Result<Option<usize>, ImportError> {
    let text = String::from_utf8_lossy(bytes);
    let vertices = text
        .lines()
        .filter(|line| line.trim_start().starts_with("v ") || line.trim() == "v")
        .count();
    if vertices == 0 {
        return Err(parse_failure("OBJ file has no vertices"));
    }
    Ok(Some(vertices))
}

fn sniff_stl(bytes: &[u8]) -> Result<Option<usize>, ImportError> {
    // Binary STL: header, triangle count, fixed-size triangles
    if bytes.len() >= STL_HEADER_LEN + 4 {
        let count_bytes = &bytes[STL_HEADER_LEN..STL_HEADER_LEN + 4];
        let triangles = u32::from_le_bytes([count_bytes[0], count_bytes[1], count_bytes[2], count_bytes[3]]) as usize;
        let expected = STL_HEADER_LEN + 4 + triangles * STL_TRIANGLE_LEN;
        if expected == bytes.len() {
            return Ok(Some(triangles * 3));
        }
    }

    let text = String::from_utf8_lossy(bytes);
    if text.trim_start().starts_with("solid") {
        let vertices = text
            .lines()
            .filter(|line| line.trim_start().starts_with("vertex"))
            .count();
        return Ok(Some(vertices));
    }

    Err(parse_failure("not an ASCII or binary STL file"))
}
