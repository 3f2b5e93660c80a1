use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::application::CrossEncoder;
use crate::domain::DomainError;

const DEFAULT_MODEL_ID: &str = "mixedbread-ai/mxbai-rerank-xsmall-v1";
const DEFAULT_MAX_SEQ_LENGTH: usize = 512;
const BATCH_SIZE: usize = 32;

/// Local cross-encoder scoring `(query, document)` pairs with a single
/// sigmoid-normalized relevance logit per pair.
pub struct OrtCrossEncoder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    model_name: String,
    max_sequence_length: usize,
}

impl OrtCrossEncoder {
    pub fn new(model_id: Option<&str>) -> Result<Self, DomainError> {
        let model_id = model_id.unwrap_or(DEFAULT_MODEL_ID);
        info!("Initializing ORT cross-encoder with model: {}", model_id);

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
        model_name: &str,
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
            model_name: model_name.to_string(),
            max_sequence_length: DEFAULT_MAX_SEQ_LENGTH,
        })
    }

    fn score_batch(&self, query: &str, documents: &[&str]) -> Result<Vec<f32>, DomainError> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = documents.len();
        let pairs: Vec<(&str, &str)> = documents.iter().map(|d| (query, *d)).collect();

        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| DomainError::embedding(format!("Tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_sequence_length);

        let mut input_ids: Vec<i64> = Vec::with_capacity(batch_size * max_len);
        let mut attention_mask: Vec<i64> = Vec::with_capacity(batch_size * max_len);

        for encoding in &encodings {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();

            let len = ids.len().min(max_len);
            input_ids.extend(ids[..len].iter().map(|&x| x as i64));
            attention_mask.extend(mask[..len].iter().map(|&x| x as i64));

            let padding = max_len - len;
            input_ids.extend(std::iter::repeat_n(0i64, padding));
            attention_mask.extend(std::iter::repeat_n(0i64, padding));
        }

        let shape = [batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape, input_ids))
            .map_err(|e| DomainError::embedding(format!("Failed to build input_ids: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((shape, attention_mask))
            .map_err(|e| DomainError::embedding(format!("Failed to build attention_mask: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| DomainError::internal(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
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
        debug!("Cross-encoder output tensor shape: {:?}", out_shape);

        match out_shape.as_slice() {
            [_, 1] | [_] => Ok(data
                .iter()
                .take(batch_size)
                .map(|&logit| sigmoid(logit))
                .collect()),
            other => Err(DomainError::embedding(format!(
                "Unexpected output tensor shape: {:?}",
                other
            ))),
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[async_trait]
impl CrossEncoder for OrtCrossEncoder {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, DomainError> {
        let refs: Vec<&str> = documents.iter().map(|s| s.as_str()).collect();
        let mut scores = Vec::with_capacity(documents.len());
        for batch in refs.chunks(BATCH_SIZE) {
            scores.extend(self.score_batch(query, batch)?);
        }
        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
