use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::application::{EmbedRole, EmbeddingService};
use crate::domain::DomainError;

const DEFAULT_MODEL_ID: &str = "BAAI/bge-small-en-v1.5";
const DEFAULT_MAX_SEQ_LENGTH: usize = 512;

/// Query-side retrieval instruction used by the BGE model family.
const BGE_QUERY_INSTRUCTION: &str =
    "Represent this sentence for searching relevant passages: ";

/// Output dimension per known model family; unknown models default to 384.
fn model_dimensions(model_id: &str) -> usize {
    if model_id.contains("bge-base") || model_id.contains("mpnet-base") {
        768
    } else if model_id.contains("bge-large") {
        1024
    } else {
        384
    }
}

fn is_bge(model_id: &str) -> bool {
    model_id.contains("bge")
}

/// ONNX Runtime embedding backend with mean pooling and L2 normalization.
/// Weights are fetched from the HuggingFace hub on first use and shared
/// read-only afterwards.
pub struct OrtEmbedding {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_id: String,
    dimensions: usize,
    max_sequence_length: usize,
}

impl OrtEmbedding {
    pub fn new(model_id: Option<&str>) -> Result<Self, DomainError> {
        let model_id = model_id.unwrap_or(DEFAULT_MODEL_ID);
        info!("Initializing ORT embedding service with model: {}", model_id);

        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_progress(true)
            .build()
            .map_err(|e| DomainError::internal(format!("Failed to create HF API: {}", e)))?;

        let repo = api.model(model_id.to_string());

        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| DomainError::internal(format!("Failed to download tokenizer: {}", e)))?;

        let model_path = repo
            .get("model.onnx")
            .or_else(|_| repo.get("onnx/model.onnx"))
            .map_err(|e| DomainError::internal(format!("Failed to download ONNX model: {}", e)))?;

        Self::from_paths(model_path, tokenizer_path, model_id)
    }

    pub fn from_paths(
        model_path: PathBuf,
        tokenizer_path: PathBuf,
        model_id: &str,
    ) -> Result<Self, DomainError> {
        info!("Loading ONNX model from: {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| DomainError::internal(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DomainError::internal(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| DomainError::internal(format!("Failed to load ONNX model: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| DomainError::internal(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            model_id: model_id.to_string(),
            dimensions: model_dimensions(model_id),
            max_sequence_length: DEFAULT_MAX_SEQ_LENGTH,
        })
    }

    /// Applies the model's retrieval instruction for query-role inputs.
    fn prepare<'a>(&self, text: &'a str, role: EmbedRole) -> std::borrow::Cow<'a, str> {
        match role {
            EmbedRole::Query if is_bge(&self.model_id) => {
                std::borrow::Cow::Owned(format!("{}{}", BGE_QUERY_INSTRUCTION, text))
            }
            _ => std::borrow::Cow::Borrowed(text),
        }
    }

    fn run_model(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| DomainError::embedding(format!("Tokenization failed: {}", e)))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_sequence_length);

        let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * max_len);
        let mut token_type_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let type_ids = encoding.get_type_ids();

            let len = ids.len().min(max_len);
            input_ids.extend(ids[..len].iter().map(|&x| x as i64));
            attention_mask.extend(mask[..len].iter().map(|&x| x as i64));
            token_type_ids.extend(type_ids[..len].iter().map(|&x| x as i64));

            let padding = max_len - len;
            input_ids.extend(std::iter::repeat_n(0i64, padding));
            attention_mask.extend(std::iter::repeat_n(0i64, padding));
            token_type_ids.extend(std::iter::repeat_n(0i64, padding));
        }

        let shape = [batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| DomainError::embedding(format!("Failed to build input_ids: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
            .map_err(|e| DomainError::embedding(format!("Failed to build attention_mask: {}", e)))?;
        let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids))
            .map_err(|e| DomainError::embedding(format!("Failed to build token_type_ids: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DomainError::internal(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            ])
            .map_err(|e| DomainError::embedding(format!("Inference failed: {}", e)))?;

        let output_value = outputs
            .iter()
            .next()
            .map(|(_, v)| v)
            .ok_or_else(|| DomainError::embedding("No output tensor found"))?;

        let (out_shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| DomainError::embedding(format!("Failed to extract output: {}", e)))?;
        let out_shape: Vec<usize> = out_shape.iter().map(|&x| x as usize).collect();
        debug!("Embedding output tensor shape: {:?}", out_shape);

        match out_shape.as_slice() {
            // Token-level output: mean-pool over the attention mask.
            [_, seq_len, hidden] => Ok((0..batch_size)
                .map(|i| {
                    let mut vector = vec![0.0f32; *hidden];
                    let mut count = 0.0f32;
                    let mask = encodings[i].get_attention_mask();
                    for j in 0..(*seq_len).min(max_len) {
                        let mask_val = if j < mask.len() { mask[j] as f32 } else { 0.0 };
                        if mask_val > 0.0 {
                            for (k, v) in vector.iter_mut().enumerate() {
                                *v += data[i * seq_len * hidden + j * hidden + k] * mask_val;
                            }
                            count += mask_val;
                        }
                    }
                    if count > 0.0 {
                        for v in &mut vector {
                            *v /= count;
                        }
                    }
                    normalize(vector)
                })
                .collect()),
            // Sentence-level output: already pooled.
            [_, hidden] => Ok((0..batch_size)
                .map(|i| {
                    let vector: Vec<f32> =
                        (0..*hidden).map(|j| data[i * hidden + j]).collect();
                    normalize(vector)
                })
                .collect()),
            other => Err(DomainError::embedding(format!(
                "Unexpected output tensor shape: {:?}",
                other
            ))),
        }
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

#[async_trait]
impl EmbeddingService for OrtEmbedding {
    async fn embed_batch(
        &self,
        texts: &[String],
        role: EmbedRole,
    ) -> Result<Vec<Vec<f32>>, DomainError> {
        let prepared: Vec<std::borrow::Cow<'_, str>> =
            texts.iter().map(|t| self.prepare(t, role)).collect();
        let refs: Vec<&str> = prepared.iter().map(|c| c.as_ref()).collect();
        self.run_model(&refs)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
