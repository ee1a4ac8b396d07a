use std::path::Path;

use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};

use crate::vision::{ImageEmbedder, VisionError, VisionResult};

/// Image embedder backed by a fastembed ONNX vision model.
pub struct FastembedImageEmbedder {
    model_name: String,
    embedding: ImageEmbedding,
}

impl FastembedImageEmbedder {
    /// Loads (downloading on first use) the model with the given code, e.g.
    /// `Qdrant/clip-ViT-B-32-vision` or just `clip-ViT-B-32-vision`.
    pub fn try_new(model_code: &str) -> VisionResult<Self> {
        let model = resolve_model(model_code)?;
        let embedding = ImageEmbedding::try_new(ImageInitOptions::new(model))
            .map_err(|error| VisionError::Model(format!("{model_code}: {error:?}")))?;

        Ok(Self {
            model_name: model_code.to_string(),
            embedding,
        })
    }
}

impl ImageEmbedder for FastembedImageEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed_image(&mut self, path: &Path) -> VisionResult<Vec<f32>> {
        self.embedding
            .embed(vec![path], None)
            .map_err(|error| VisionError::Inference(format!("{error:?}")))?
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::Inference("model returned no embedding".to_string()))
    }
}

/// Finds the fastembed model whose code matches, with or without the
/// organisation prefix.
pub fn resolve_model(model_code: &str) -> VisionResult<ImageEmbeddingModel> {
    let wanted = short_code(model_code);
    ImageEmbedding::list_supported_models()
        .into_iter()
        .find(|info| short_code(&info.model_code).eq_ignore_ascii_case(wanted))
        .map(|info| info.model)
        .ok_or_else(|| VisionError::Model(format!("unsupported image model '{model_code}'")))
}

fn short_code(code: &str) -> &str {
    code.rsplit('/').next().unwrap_or(code)
}
