//! Safetensors-backed model weight loading.

use std::collections::HashMap;
use std::path::Path;

use memmap2::MmapOptions;
use safetensors::tensor::{Dtype, SafeTensorError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct TensorF32 {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl TensorF32 {
    #[must_use]
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        Self { shape, data }
    }

    #[must_use]
    pub fn filled(shape: &[usize], value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; len],
        }
    }
}

#[derive(Debug)]
pub struct WeightStore {
    mmap: memmap2::Mmap,
}

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] SafeTensorError),
    #[error("unsupported dtype for {name}: {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },
    #[error("invalid tensor byte length for {name}: got {bytes}, expected multiple of {elem_size}")]
    InvalidByteLen {
        name: String,
        bytes: usize,
        elem_size: usize,
    },
    #[error("missing tensor {0}")]
    Missing(String),
    #[error("tensor {name} has shape {got:?}, expected {expected:?}")]
    Shape {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

/// Anything that can hand out named `f32` tensors.
///
/// Implemented by the memory-mapped [`WeightStore`] and by a plain map, which is
/// what fixtures build in tests.
pub trait TensorSource {
    fn tensor_f32(&self, name: &str) -> Result<TensorF32, WeightError>;

    /// Fetch `name` and require its shape to equal `expected`.
    fn tensor_with_shape(&self, name: &str, expected: &[usize]) -> Result<TensorF32, WeightError> {
        let tensor = self.tensor_f32(name)?;
        if tensor.shape != expected {
            return Err(WeightError::Shape {
                name: name.to_string(),
                expected: expected.to_vec(),
                got: tensor.shape,
            });
        }
        Ok(tensor)
    }
}

impl WeightStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WeightError> {
        let file = std::fs::File::open(path)?;
        // SAFETY: read-only file mapping for immutable tensor access.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        // Reject a corrupt header at open time rather than on first lookup.
        safetensors::SafeTensors::deserialize(&mmap)?;
        Ok(Self { mmap })
    }

    pub fn names(&self) -> Result<Vec<String>, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let mut names: Vec<String> = st.iter().map(|(name, _)| name.to_string()).collect();
        names.sort();
        Ok(names)
    }
}

impl TensorSource for WeightStore {
    fn tensor_f32(&self, name: &str) -> Result<TensorF32, WeightError> {
        let st = safetensors::SafeTensors::deserialize(&self.mmap)?;
        let view = st.tensor(name).map_err(|err| match err {
            SafeTensorError::TensorNotFound(_) => WeightError::Missing(name.to_string()),
            other => other.into(),
        })?;
        let data = widen_to_f32(name, view.dtype(), view.data())?;
        Ok(TensorF32::new(view.shape().to_vec(), data))
    }
}

/// Little-endian F32 is copied out; BF16 is widened by shifting into the high half.
fn widen_to_f32(name: &str, dtype: Dtype, raw: &[u8]) -> Result<Vec<f32>, WeightError> {
    let width = match dtype {
        Dtype::F32 => 4,
        Dtype::BF16 => 2,
        other => {
            return Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: other,
            });
        }
    };
    if raw.len() % width != 0 {
        return Err(WeightError::InvalidByteLen {
            name: name.to_string(),
            bytes: raw.len(),
            elem_size: width,
        });
    }

    let elems = raw.chunks_exact(width);
    Ok(if width == 4 {
        elems
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    } else {
        elems
            .map(|b| f32::from_bits(u32::from(u16::from_le_bytes([b[0], b[1]])) << 16))
            .collect()
    })
}

impl TensorSource for HashMap<String, TensorF32> {
    fn tensor_f32(&self, name: &str) -> Result<TensorF32, WeightError> {
        self.get(name)
            .cloned()
            .ok_or_else(|| WeightError::Missing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use safetensors::tensor::{Dtype, View, serialize_to_file};

    use super::{TensorF32, TensorSource, WeightError, WeightStore};

    #[derive(Debug, Clone)]
    struct TestTensor {
        dtype: Dtype,
        shape: Vec<usize>,
        data: Vec<u8>,
    }

    impl View for TestTensor {
        fn dtype(&self) -> Dtype {
            self.dtype
        }

        fn shape(&self) -> &[usize] {
            &self.shape
        }

        fn data(&self) -> Cow<'_, [u8]> {
            Cow::Borrowed(&self.data)
        }

        fn data_len(&self) -> usize {
            self.data.len()
        }
    }

    fn tmp_file(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        p.push(format!("quietmask-weights-test-{name}-{nanos}.safetensors"));
        p
    }

    fn le_bytes<const N: usize>(words: impl IntoIterator<Item = [u8; N]>) -> Vec<u8> {
        words.into_iter().flatten().collect()
    }

    #[test]
    fn conv_weight_and_bf16_bias_are_widened() {
        let kernel = [0.25f32, -1.5, 3.0, 0.0];
        let tensors = vec![
            (
                "dec1.3.weight".to_string(),
                TestTensor {
                    dtype: Dtype::F32,
                    shape: vec![1, 1, 2, 2],
                    data: le_bytes(kernel.map(f32::to_le_bytes)),
                },
            ),
            (
                "dec1.3.bias".to_string(),
                TestTensor {
                    dtype: Dtype::BF16,
                    shape: vec![3],
                    // 0.5, -2.0, 1.0 truncated to their upper 16 bits
                    data: le_bytes([0x3f00u16, 0xc000, 0x3f80].map(u16::to_le_bytes)),
                },
            ),
        ];

        let path = tmp_file("widen");
        serialize_to_file(tensors, &None, &path).expect("write fixture");

        let store = WeightStore::open(&path).expect("open");
        assert_eq!(
            store.names().expect("list"),
            vec!["dec1.3.bias", "dec1.3.weight"]
        );

        let w = store
            .tensor_with_shape("dec1.3.weight", &[1, 1, 2, 2])
            .expect("kernel");
        assert_eq!(w.data, kernel);

        let b = store.tensor_f32("dec1.3.bias").expect("bias");
        assert_eq!(b.data, vec![0.5, -2.0, 1.0]);

        assert!(matches!(
            store.tensor_f32("dec9.3.weight"),
            Err(WeightError::Missing(name)) if name == "dec9.3.weight"
        ));

        std::fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn rejects_integer_tensors() {
        let tensors = vec![(
            "enc1.1.num_batches_tracked",
            TestTensor {
                dtype: Dtype::I64,
                shape: vec![],
                data: 7i64.to_le_bytes().to_vec(),
            },
        )];
        let path = tmp_file("int");
        serialize_to_file(tensors, &None, &path).expect("serialize safetensors");

        let ws = WeightStore::open(&path).expect("open");
        let err = ws
            .tensor_f32("enc1.1.num_batches_tracked")
            .expect_err("i64 is not a weight dtype");
        assert!(matches!(err, WeightError::UnsupportedDtype { .. }));

        std::fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn garbage_file_fails_to_open() {
        let path = tmp_file("garbage");
        std::fs::write(&path, b"definitely not safetensors").expect("write");
        assert!(WeightStore::open(&path).is_err());
        std::fs::remove_file(path).expect("cleanup");
    }

    #[test]
    fn shape_check_reports_expected_and_actual() {
        let mut map = HashMap::new();
        map.insert(
            "final.0.weight".to_string(),
            TensorF32::filled(&[1, 16, 1, 1], 0.5),
        );

        assert!(map.tensor_with_shape("final.0.weight", &[1, 16, 1, 1]).is_ok());
        match map.tensor_with_shape("final.0.weight", &[1, 8, 1, 1]) {
            Err(WeightError::Shape { expected, got, .. }) => {
                assert_eq!(expected, vec![1, 8, 1, 1]);
                assert_eq!(got, vec![1, 16, 1, 1]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
