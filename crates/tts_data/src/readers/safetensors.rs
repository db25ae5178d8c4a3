use anyhow::{bail, ensure, Context, Result};
use ndarray::Array2;
use ::safetensors::tensor::{Dtype, Metadata};
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
    path::PathBuf,
};

/// Upper bound on the JSON header size, as enforced by the safetensors format.
const MAX_HEADER_SIZE: u64 = 100_000_000;

/// Reads single feature matrices out of a safetensors archive.
///
/// Feature archives typically hold the matrices of thousands of cuts, so
/// only the header and the requested tensor's byte range are read; the rest
/// of the file is never touched.
///
/// # Example
/// ```ignore
/// let archive = SafetensorsSource::new("data/fbank/feats-0.safetensors");
/// let fbank = archive.load_matrix("utt-0001")?; // [num_frames, num_features]
/// ```
#[derive(Debug, Clone)]
pub struct SafetensorsSource {
    path: PathBuf,
}

impl SafetensorsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the 2-D tensor stored under `key` as an `f32` matrix.
    ///
    /// Supported dtypes: F32, F64 (narrowed to f32).
    pub fn load_matrix(&self, key: &str) -> Result<Array2<f32>> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("Failed to open feature archive {}", self.path.display()))?;

        let file_len = file
            .metadata()
            .with_context(|| format!("Failed to stat feature archive {}", self.path.display()))?
            .len();

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)
            .with_context(|| format!("Truncated safetensors header in {}", self.path.display()))?;
        let header_len = u64::from_le_bytes(len_bytes);
        ensure!(
            header_len <= MAX_HEADER_SIZE && header_len <= file_len.saturating_sub(8),
            "Invalid safetensors header length {} in {} ({} bytes)",
            header_len,
            self.path.display(),
            file_len
        );

        let mut header = vec![0u8; header_len as usize];
        file.read_exact(&mut header)
            .with_context(|| format!("Truncated safetensors header in {}", self.path.display()))?;
        let metadata: Metadata = serde_json::from_slice(&header)
            .with_context(|| format!("Invalid safetensors header in {}", self.path.display()))?;

        let info = metadata.info(key).with_context(|| {
            format!("Tensor '{}' not found in {}", key, self.path.display())
        })?;
        ensure!(
            info.shape.len() == 2,
            "Feature tensor '{}' must be 2-D [frames, features], got shape {:?}",
            key,
            info.shape
        );

        let (begin, end) = info.data_offsets;
        let expected = info
            .shape
            .iter()
            .try_fold(info.dtype.size(), |acc, &d| acc.checked_mul(d));
        let data_start = 8 + header_len;
        ensure!(
            begin <= end
                && expected == Some(end - begin)
                && data_start.checked_add(end as u64).is_some_and(|e| e <= file_len),
            "Tensor '{}' in {} has invalid data offsets [{}, {}] for {:?} {:?}",
            key,
            self.path.display(),
            begin,
            end,
            info.dtype,
            info.shape
        );

        let mut raw = vec![0u8; end - begin];
        file.seek(SeekFrom::Start(data_start + begin as u64))?;
        file.read_exact(&mut raw)
            .with_context(|| format!("Failed to read tensor '{}' data", key))?;

        let values: Vec<f32> = match info.dtype {
            Dtype::F32 => bytemuck::pod_collect_to_vec::<u8, f32>(&raw),
            Dtype::F64 => bytemuck::pod_collect_to_vec::<u8, f64>(&raw)
                .into_iter()
                .map(|v| v as f32)
                .collect(),
            other => bail!("Unsupported feature dtype {:?} for tensor '{}'", other, key),
        };

        Array2::from_shape_vec((info.shape[0], info.shape[1]), values)
            .with_context(|| format!("Tensor '{}' data does not match its shape", key))
    }
}
