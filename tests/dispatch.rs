//! Single-item and batch dispatch through a model adapter.

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use taxon_contract::adapter::{
    AnalysisResult, ImageAnalysisRequest, InitError, ModelRoot, TextAnalysisRequest,
};
use taxon_contract::{
    DispatchError, Dispatcher, Predictor, RequestContext, ValidationError, ValidationPolicy,
};

mod support;
use support::{BinaryTextModel, ModelFailure, TAXONOMY, binary_document, binary_model, model_dir};

type Outcome<T> = Result<T, DispatchError<ModelFailure>>;

#[fixture]
fn dispatcher() -> Dispatcher<BinaryTextModel> {
    Dispatcher::new(binary_model("sample\nslur 0.75\n"))
}

fn ok<T>(outcome: Outcome<T>) -> T {
    outcome.unwrap_or_else(|e| panic!("dispatch failed: {e}"))
}

#[rstest]
fn normalised_request_returns_response_document(dispatcher: Dispatcher<BinaryTextModel>) {
    let response = ok(dispatcher.run(json!({"text": "sample"}), &RequestContext::NORMALIZED));
    assert_eq!(response, binary_document(1, 0.9));
}

#[rstest]
fn raw_request_returns_model_output_in_a_list(dispatcher: Dispatcher<BinaryTextModel>) {
    let response = ok(dispatcher.run(json!({"data": "sample"}), &RequestContext::RAW));
    assert_eq!(response, json!([{"score": 0.9}]));
}

#[rstest]
fn raw_request_must_match_model_input(dispatcher: Dispatcher<BinaryTextModel>) {
    let err = dispatcher.run(json!({"text": "sample"}), &RequestContext::RAW).err();
    assert!(matches!(err, Some(DispatchError::Payload { index: 0, .. })));
}

#[rstest]
fn normalised_request_needs_a_modality(dispatcher: Dispatcher<BinaryTextModel>) {
    let err = dispatcher.run(json!({"width": 3}), &RequestContext::NORMALIZED).err();
    assert!(matches!(err, Some(DispatchError::Input { index: 0, .. })));
    assert_eq!(dispatcher.adapter().infer_calls(), 0);
}

/// Collects formatted log lines for inspection.
#[cfg(feature = "cli")]
#[derive(Clone, Default)]
struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(feature = "cli")]
impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|e| panic!("log buffer poisoned: {e}"))
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(feature = "cli")]
#[rstest]
fn single_normalised_request_logs_converted_input(dispatcher: Dispatcher<BinaryTextModel>) {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let response = tracing::subscriber::with_default(subscriber, || {
        dispatcher.run(json!({"text": "sample"}), &RequestContext::NORMALIZED)
    });
    assert_eq!(ok(response), binary_document(1, 0.9));
    let captured = logs
        .0
        .lock()
        .unwrap_or_else(|e| panic!("log buffer poisoned: {e}"))
        .clone();
    let text = String::from_utf8_lossy(&captured);
    assert!(text.contains("converted canonical inputs"), "logs: {text}");
}

#[rstest]
fn batch_preserves_order(dispatcher: Dispatcher<BinaryTextModel>) {
    let items = vec![
        json!({"text": "benign"}),
        json!({"text": "sample"}),
        json!({"text": "a slur"}),
    ];
    let responses = ok(dispatcher.run_batch(items, &RequestContext::NORMALIZED));
    assert_eq!(
        responses,
        [binary_document(0, 0.1), binary_document(1, 0.9), binary_document(1, 0.75)]
    );
    assert_eq!(dispatcher.adapter().batch_calls(), 1);
}

#[rstest]
fn batch_matches_single_requests(dispatcher: Dispatcher<BinaryTextModel>) {
    let items: Vec<Value> = ["one", "sample", "three slur"]
        .iter()
        .map(|text| json!({"text": text}))
        .collect();
    let singles: Vec<Value> = items
        .iter()
        .map(|item| ok(dispatcher.run(item.clone(), &RequestContext::NORMALIZED)))
        .collect();
    let batch = ok(dispatcher.run_batch(items, &RequestContext::NORMALIZED));
    assert_eq!(batch, singles);
}

#[rstest]
fn raw_batch_returns_model_outputs(dispatcher: Dispatcher<BinaryTextModel>) {
    let items = vec![json!({"data": "sample"}), json!({"data": "nothing"})];
    let responses = ok(dispatcher.run_batch(items, &RequestContext::RAW));
    assert_eq!(responses, [json!({"score": 0.9}), json!({"score": 0.1})]);
    assert_eq!(dispatcher.adapter().batch_calls(), 1);
}

#[rstest]
fn empty_batch_skips_the_model(dispatcher: Dispatcher<BinaryTextModel>) {
    let responses = ok(dispatcher.run_batch(Vec::new(), &RequestContext::NORMALIZED));
    assert!(responses.is_empty());
    assert_eq!(dispatcher.adapter().batch_calls(), 0);
}

#[rstest]
fn bad_item_fails_the_whole_batch_before_inference(dispatcher: Dispatcher<BinaryTextModel>) {
    let items = vec![json!({"text": "sample"}), json!({}), json!({"text": "x"})];
    let err = dispatcher.run_batch(items, &RequestContext::NORMALIZED).err();
    assert!(matches!(err, Some(DispatchError::Input { index: 1, .. })));
    assert_eq!(dispatcher.adapter().batch_calls(), 0);
    assert_eq!(dispatcher.adapter().infer_calls(), 0);
}

#[rstest]
fn model_errors_propagate_unchanged(dispatcher: Dispatcher<BinaryTextModel>) {
    let items = vec![json!({"text": "sample"}), json!({"text": "explode"})];
    let err = dispatcher.run_batch(items, &RequestContext::NORMALIZED).err();
    assert!(matches!(&err, Some(DispatchError::Model(ModelFailure(message))) if message.contains("explode")));
    assert_eq!(
        err.map(|e| e.to_string()).as_deref(),
        Some("model failure: cannot score \"explode\"")
    );
}

#[rstest]
fn misaligned_batch_is_rejected() {
    let dispatcher = Dispatcher::new(binary_model("sample").dropping_last_output());
    let items = vec![json!({"text": "a"}), json!({"text": "b"})];
    let err = dispatcher.run_batch(items, &RequestContext::NORMALIZED).err();
    assert!(matches!(
        err,
        Some(DispatchError::BatchLength {
            expected: 2,
            actual: 1
        })
    ));
}

#[rstest]
fn policy_applies_to_adapter_outputs() {
    let dispatcher = Dispatcher::new(binary_model("sample"))
        .with_policy(ValidationPolicy::default().with_ordinal(TAXONOMY));
    let benign = dispatcher.run(json!({"text": "fine"}), &RequestContext::NORMALIZED);
    assert!(benign.is_ok());
    let err = dispatcher
        .run_batch(
            vec![json!({"text": "fine"}), json!({"text": "sample"})],
            &RequestContext::NORMALIZED,
        )
        .err();
    assert!(matches!(
        err,
        Some(DispatchError::Output {
            index: 1,
            source: ValidationError::OrdinalViolation { .. }
        })
    ));
}

#[rstest]
fn unit_interval_policy_catches_overconfident_models() {
    let policy = ValidationPolicy {
        require_unit_interval: true,
        ..ValidationPolicy::default()
    };
    let dispatcher = Dispatcher::new(binary_model("loud 1.5")).with_policy(policy);
    let err = dispatcher
        .run(json!({"text": "loud"}), &RequestContext::NORMALIZED)
        .err();
    assert!(matches!(
        err,
        Some(DispatchError::Output {
            source: ValidationError::ScoreOutOfRange { value, .. },
            ..
        }) if value > 1.0
    ));
}

#[rstest]
fn raw_mode_bypasses_the_policy() {
    let dispatcher = Dispatcher::new(binary_model("sample"))
        .with_policy(ValidationPolicy::default().with_ordinal(TAXONOMY));
    let response = ok(dispatcher.run(json!({"data": "sample"}), &RequestContext::RAW));
    assert_eq!(response, json!([{"score": 0.9}]));
}

#[rstest]
fn text_analysis_uses_adapter_hooks(dispatcher: Dispatcher<BinaryTextModel>) {
    let request = TextAnalysisRequest {
        text: "a sample".into(),
    };
    let response = ok(dispatcher.analyze_text(&request));
    assert_eq!(
        response.hate,
        AnalysisResult {
            harmful_score: 0.9,
            severity_level: 4
        }
    );
    assert_eq!(response.violence, AnalysisResult::default());
}

#[rstest]
fn image_analysis_is_unsupported_without_hooks(dispatcher: Dispatcher<BinaryTextModel>) {
    let err = dispatcher.analyze_image(&ImageAnalysisRequest::default()).err();
    assert!(matches!(err, Some(DispatchError::Unsupported("image analysis"))));
}

#[rstest]
fn predictor_boxes_dispatch_errors(dispatcher: Dispatcher<BinaryTextModel>) {
    let predictor: &dyn Predictor = &dispatcher;
    let responses = predictor
        .predict(vec![json!({"text": "sample"})], &RequestContext::NORMALIZED)
        .unwrap_or_else(|e| panic!("predict failed: {e}"));
    assert_eq!(responses, [binary_document(1, 0.9)]);
    let err = predictor
        .predict(vec![json!("sample")], &RequestContext::NORMALIZED)
        .err();
    assert!(err.is_some_and(|e| e.to_string().contains("JSON object")));
}

#[rstest]
fn init_loads_artefacts_from_the_model_root() {
    let dir = model_dir("sample");
    let root = ModelRoot::new(dir.path()).unwrap_or_else(|e| panic!("root: {e}"));
    let dispatcher = Dispatcher::<BinaryTextModel>::init(&root)
        .unwrap_or_else(|e| panic!("init failed: {e}"));
    let response = ok(dispatcher.run(json!({"text": "sample"}), &RequestContext::NORMALIZED));
    assert_eq!(response, binary_document(1, 0.9));
}

#[rstest]
fn init_fails_without_artefacts() {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("temp dir: {e}"));
    let root = ModelRoot::new(dir.path()).unwrap_or_else(|e| panic!("root: {e}"));
    assert!(matches!(
        Dispatcher::<BinaryTextModel>::init(&root),
        Err(InitError::MissingArtefact { .. })
    ));
}

#[rstest]
fn init_surfaces_model_load_errors() {
    let dir = model_dir("sample not-a-weight");
    let root = ModelRoot::new(dir.path()).unwrap_or_else(|e| panic!("root: {e}"));
    assert!(matches!(
        Dispatcher::<BinaryTextModel>::init(&root),
        Err(InitError::Model(_))
    ));
}
