//! Test doubles shared by the integration tests.
#![allow(dead_code, reason = "each test crate uses a different subset")]

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use taxon_contract::adapter::{
    AnalysisResult, HarmCategoryResponse, InitError, ModelAdapter, ModelRoot, TextAnalysisHooks,
    TextAnalysisRequest,
};
use taxon_contract::taxonomy::{TaxonomyLabel, TaxonomyScore};
use taxon_contract::{CanonicalInput, CanonicalOutput, ValidationError};
use tempfile::TempDir;
use thiserror::Error;

pub const LEXICON: &str = "lexicon.txt";
pub const TAXONOMY: &str = "identity_hate";
pub const TRIGGER: &str = "explode";

const DEFAULT_WEIGHT: f64 = 0.9;
const BASELINE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TextInput {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScoreOutput {
    pub score: f64,
}

#[derive(Debug, Error)]
#[error("model failure: {0}")]
pub struct ModelFailure(pub String);

/// Flags text containing any lexicon word under `identity_hate`.
///
/// The lexicon artefact holds one `word [weight]` per line. A text scores the
/// highest weight among the words it contains, or a baseline of 0.1.
#[derive(Debug, Default)]
pub struct BinaryTextModel {
    lexicon: Vec<(String, f64)>,
    drop_last_output: bool,
    batch_calls: AtomicUsize,
    infer_calls: AtomicUsize,
}

impl BinaryTextModel {
    /// Make `infer_batch` return one output fewer than it was given.
    #[must_use]
    pub fn dropping_last_output(mut self) -> Self {
        self.drop_last_output = true;
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn infer_calls(&self) -> usize {
        self.infer_calls.load(Ordering::SeqCst)
    }

    fn score(&self, text: &str) -> f64 {
        self.lexicon
            .iter()
            .filter(|(word, _)| text.contains(word.as_str()))
            .map(|&(_, weight)| weight)
            .fold(BASELINE, f64::max)
    }
}

impl ModelAdapter for BinaryTextModel {
    type Input = TextInput;
    type Output = ScoreOutput;
    type Error = ModelFailure;

    fn init(root: &ModelRoot) -> Result<Self, InitError> {
        let path = root.artefact(LEXICON)?;
        let raw = std::fs::read_to_string(&path).map_err(|source| InitError::Io {
            path: path.clone(),
            source,
        })?;
        let mut lexicon = Vec::new();
        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else { continue };
            let weight = match fields.next() {
                Some(weight) => weight
                    .parse()
                    .map_err(|e| InitError::Model(Box::new(e)))?,
                None => DEFAULT_WEIGHT,
            };
            lexicon.push((word.to_owned(), weight));
        }
        Ok(Self {
            lexicon,
            ..Self::default()
        })
    }

    fn infer(&self, input: TextInput) -> Result<ScoreOutput, ModelFailure> {
        self.infer_calls.fetch_add(1, Ordering::SeqCst);
        if input.data.contains(TRIGGER) {
            return Err(ModelFailure(format!("cannot score {:?}", input.data)));
        }
        Ok(ScoreOutput {
            score: self.score(&input.data),
        })
    }

    fn infer_batch(&self, inputs: Vec<TextInput>) -> Result<Vec<ScoreOutput>, ModelFailure> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = inputs
            .into_iter()
            .map(|input| self.infer(input))
            .collect::<Result<Vec<_>, _>>()?;
        if self.drop_last_output {
            outputs.pop();
        }
        Ok(outputs)
    }

    fn map_input(&self, input: &CanonicalInput) -> TextInput {
        TextInput {
            data: input.text().unwrap_or_default().to_owned(),
        }
    }

    #[expect(clippy::float_arithmetic, reason = "complement of a probability")]
    fn map_output(&self, output: ScoreOutput) -> Result<CanonicalOutput, ValidationError> {
        let flagged = u8::from(output.score > 0.5);
        CanonicalOutput::from_parts(
            [TaxonomyLabel::new(
                TAXONOMY,
                [("positive", flagged), ("negative", 1 - flagged)],
            )?],
            [TaxonomyScore::new(
                TAXONOMY,
                [("positive", output.score), ("negative", 1.0 - output.score)],
            )?],
        )
    }

    fn text_analysis(
        &self,
    ) -> Option<&dyn TextAnalysisHooks<Input = TextInput, Output = ScoreOutput>> {
        Some(self)
    }
}

impl TextAnalysisHooks for BinaryTextModel {
    type Input = TextInput;
    type Output = ScoreOutput;

    fn text_request_to_input(&self, request: &TextAnalysisRequest) -> TextInput {
        TextInput {
            data: request.text.clone(),
        }
    }

    fn output_to_text_response(&self, output: ScoreOutput) -> HarmCategoryResponse {
        let severity_level = if output.score > 0.5 { 4 } else { 0 };
        HarmCategoryResponse {
            hate: AnalysisResult {
                harmful_score: output.score,
                severity_level,
            },
            ..HarmCategoryResponse::default()
        }
    }
}

/// A model root holding a lexicon artefact with `contents`.
pub fn model_dir(contents: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("create model dir: {e}"));
    std::fs::write(dir.path().join(LEXICON), contents)
        .unwrap_or_else(|e| panic!("write lexicon: {e}"));
    dir
}

/// Initialise a [`BinaryTextModel`] from a fresh model root.
pub fn binary_model(contents: &str) -> BinaryTextModel {
    let dir = model_dir(contents);
    let root = ModelRoot::new(dir.path()).unwrap_or_else(|e| panic!("model root: {e}"));
    BinaryTextModel::init(&root).unwrap_or_else(|e| panic!("init model: {e}"))
}

/// The response document for a single binary taxonomy.
pub fn binary_document(positive: u8, score: f64) -> Value {
    #[expect(clippy::float_arithmetic, reason = "complement of a probability")]
    let complement = 1.0 - score;
    json!({
        "predicted_labels": {TAXONOMY: {"positive": positive, "negative": 1 - positive}},
        "confidence_scores": {TAXONOMY: {"positive": score, "negative": complement}},
    })
}
