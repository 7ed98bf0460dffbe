//! ONNX export of trained classifiers
//!
//! Every artifact has one float input `float_input [N, width]` and its first
//! output is `label [N]` (int64, 0 or 1). The score graph of the classifier
//! is lowered to standard opset-13 operators and thresholded at zero.

use crate::classifier::{Classifier, ScoreGraph};
use crate::config::ModelConfig;
use crate::onnx::{
    data_type, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto, TensorProto, ValueInfoProto, IR_VERSION, OPSET_VERSION,
};
use serde::Serialize;

pub const INPUT_NAME: &str = "float_input";
pub const OUTPUT_NAME: &str = "label";
pub const PRODUCER_NAME: &str = "delay-lib";
pub const DOC_STRING: &str = "Delay Prediction Model - LATAM Airlines";

/// Metadata property keys
pub mod keys {
    pub const VERSION: &str = "version";
    pub const DELAY_THRESHOLD_MINUTES: &str = "delay_threshold_minutes";
    pub const CLASSIFIER: &str = "classifier";
    pub const RANDOM_STATE: &str = "random_state";
    pub const FEATURE_NAMES: &str = "feature_names";
}

/// Separator used for the `feature_names` property
const FEATURE_SEPARATOR: char = '|';

/// Descriptive fields read back from an artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub version: Option<String>,
    pub delay_threshold_minutes: Option<String>,
    pub classifier: Option<String>,
    pub random_state: Option<String>,
    pub feature_names: Vec<String>,
    pub producer: String,
    pub doc_string: String,
    /// Declared input width, when static
    pub n_features: Option<usize>,
}

impl ArtifactMetadata {
    pub fn from_model(model: &ModelProto) -> Self {
        let owned = |key: &str| model.metadata(key).map(str::to_string);
        let feature_names = model
            .metadata(keys::FEATURE_NAMES)
            .filter(|s| !s.is_empty())
            .map(|s| s.split(FEATURE_SEPARATOR).map(str::to_string).collect())
            .unwrap_or_default();

        Self {
            version: owned(keys::VERSION),
            delay_threshold_minutes: owned(keys::DELAY_THRESHOLD_MINUTES),
            classifier: owned(keys::CLASSIFIER),
            random_state: owned(keys::RANDOM_STATE),
            feature_names,
            producer: model.producer_name.clone(),
            doc_string: model.doc_string.clone(),
            n_features: model.input_width(),
        }
    }

    /// Decode an artifact and read its metadata
    pub fn read(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Ok(Self::from_model(&ModelProto::from_bytes(bytes)?))
    }
}

/// Build the ONNX model for a classifier with a fixed input width
pub fn build_model(classifier: &dyn Classifier, config: &ModelConfig, width: usize) -> ModelProto {
    let metadata_props = vec![
        StringStringEntryProto::new(keys::VERSION, config.model_version.clone()),
        StringStringEntryProto::new(
            keys::DELAY_THRESHOLD_MINUTES,
            config.delay_threshold_minutes.to_string(),
        ),
        StringStringEntryProto::new(keys::CLASSIFIER, classifier.kind().as_str()),
        StringStringEntryProto::new(keys::RANDOM_STATE, config.random_state.to_string()),
        StringStringEntryProto::new(
            keys::FEATURE_NAMES,
            config.top_features.join(&FEATURE_SEPARATOR.to_string()),
        ),
    ];

    ModelProto {
        ir_version: IR_VERSION,
        producer_name: PRODUCER_NAME.to_string(),
        producer_version: env!("CARGO_PKG_VERSION").to_string(),
        domain: String::new(),
        model_version: 1,
        doc_string: DOC_STRING.to_string(),
        graph: Some(build_graph(classifier.score_graph(), width)),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: OPSET_VERSION,
        }],
        metadata_props,
    }
}

fn build_graph(score: ScoreGraph, width: usize) -> GraphProto {
    let score = match score {
        // Boosting stopped before the first round; the score is constant
        ScoreGraph::Stumps { features, bias, .. } if features.is_empty() => ScoreGraph::Linear {
            coefficients: vec![0.0; width],
            intercept: bias,
        },
        other => other,
    };

    let mut nodes = Vec::new();
    let mut initializer = Vec::new();

    match score {
        ScoreGraph::Linear {
            coefficients,
            intercept,
        } => {
            let n = coefficients.len() as i64;
            initializer.push(TensorProto::float("coefficients", &[n, 1], coefficients));
            initializer.push(TensorProto::float("intercept", &[1], vec![intercept]));
            nodes.push(NodeProto::new(
                "MatMul",
                "linear_matmul",
                &[INPUT_NAME, "coefficients"],
                &["linear_product"],
            ));
            nodes.push(NodeProto::new(
                "Add",
                "linear_add",
                &["linear_product", "intercept"],
                &["score"],
            ));
        }
        ScoreGraph::Stumps {
            features,
            thresholds,
            deltas,
            bias,
        } => {
            let n = features.len() as i64;
            initializer.push(TensorProto::int64("stump_features", &[n], features));
            initializer.push(TensorProto::float("stump_thresholds", &[n], thresholds));
            initializer.push(TensorProto::float("stump_deltas", &[n, 1], deltas));
            initializer.push(TensorProto::float("stump_bias", &[1], vec![bias]));
            nodes.push(
                NodeProto::new(
                    "Gather",
                    "stump_gather",
                    &[INPUT_NAME, "stump_features"],
                    &["stump_inputs"],
                )
                .with_attribute(AttributeProto::int("axis", 1)),
            );
            nodes.push(NodeProto::new(
                "Less",
                "stump_less",
                &["stump_inputs", "stump_thresholds"],
                &["stump_left"],
            ));
            nodes.push(
                NodeProto::new("Cast", "stump_cast", &["stump_left"], &["stump_indicator"])
                    .with_attribute(AttributeProto::int("to", data_type::FLOAT as i64)),
            );
            nodes.push(NodeProto::new(
                "MatMul",
                "stump_matmul",
                &["stump_indicator", "stump_deltas"],
                &["stump_sum"],
            ));
            nodes.push(NodeProto::new(
                "Add",
                "stump_add",
                &["stump_sum", "stump_bias"],
                &["score"],
            ));
        }
    }

    // label = reshape(cast(score > 0), [-1])
    initializer.push(TensorProto::float("zero", &[1], vec![0.0]));
    initializer.push(TensorProto::int64("flat_shape", &[1], vec![-1]));
    nodes.push(NodeProto::new(
        "Greater",
        "decision",
        &["score", "zero"],
        &["is_delayed"],
    ));
    nodes.push(
        NodeProto::new("Cast", "decision_cast", &["is_delayed"], &["label_column"])
            .with_attribute(AttributeProto::int("to", data_type::INT64 as i64)),
    );
    nodes.push(NodeProto::new(
        "Reshape",
        "flatten",
        &["label_column", "flat_shape"],
        &[OUTPUT_NAME],
    ));

    GraphProto {
        node: nodes,
        name: "delay_model".to_string(),
        initializer,
        doc_string: String::new(),
        input: vec![ValueInfoProto::tensor(
            INPUT_NAME,
            data_type::FLOAT,
            &[None, Some(width as i64)],
        )],
        output: vec![ValueInfoProto::untyped_shape(OUTPUT_NAME, data_type::INT64)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LogisticRegression;
    use crate::classifier::{BoostingConfig, GradientBoostedStumps, LogisticConfig};
    use crate::predictor::FeatureMatrix;

    fn config() -> ModelConfig {
        ModelConfig {
            top_features: vec!["OPERA_A".to_string(), "MES_7".to_string()],
            model_version: "2.3".to_string(),
            delay_threshold_minutes: 20,
            ..Default::default()
        }
    }

    fn features() -> (FeatureMatrix, Vec<i64>) {
        let columns = vec!["OPERA_A".to_string(), "MES_7".to_string()];
        let rows = vec![
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0],
        ];
        (FeatureMatrix::from_rows(columns, rows).unwrap(), vec![1, 1, 0, 0])
    }

    #[test]
    fn test_metadata_is_recorded() {
        let (x, y) = features();
        let classifier = LogisticRegression::fit(&LogisticConfig::default(), &x, &y).unwrap();
        let model = build_model(&classifier, &config(), 2);

        let metadata = ArtifactMetadata::read(&model.to_bytes()).unwrap();
        assert_eq!(metadata.version.as_deref(), Some("2.3"));
        assert_eq!(metadata.delay_threshold_minutes.as_deref(), Some("20"));
        assert_eq!(metadata.classifier.as_deref(), Some("logistic"));
        assert_eq!(metadata.random_state.as_deref(), Some("1"));
        assert_eq!(metadata.feature_names, vec!["OPERA_A", "MES_7"]);
        assert_eq!(metadata.doc_string, DOC_STRING);
        assert_eq!(metadata.n_features, Some(2));
    }

    #[test]
    fn test_linear_graph_layout() {
        let (x, y) = features();
        let classifier = LogisticRegression::fit(&LogisticConfig::default(), &x, &y).unwrap();
        let graph = build_model(&classifier, &config(), 2).graph.unwrap();

        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["MatMul", "Add", "Greater", "Cast", "Reshape"]);
        assert_eq!(graph.input[0].name, INPUT_NAME);
        assert_eq!(graph.output[0].name, OUTPUT_NAME);
        let coefficients = graph
            .initializer
            .iter()
            .find(|t| t.name == "coefficients")
            .unwrap();
        assert_eq!(coefficients.dims, vec![2, 1]);
    }

    #[test]
    fn test_stump_graph_layout() {
        let (x, y) = features();
        // Four rows leave too little hessian per side for the default child weight
        let config = BoostingConfig {
            n_estimators: 3,
            min_child_weight: 0.0,
            ..Default::default()
        };
        let classifier = GradientBoostedStumps::fit(&config, &x, &y).unwrap();
        assert!(!classifier.stumps().is_empty());
        let graph = build_model(&classifier, &ModelConfig::default(), 2).graph.unwrap();

        let ops: Vec<&str> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(
            ops,
            vec!["Gather", "Less", "Cast", "MatMul", "Add", "Greater", "Cast", "Reshape"]
        );
    }

    #[test]
    fn test_empty_ensemble_exports_constant_score() {
        let graph = build_graph(
            ScoreGraph::Stumps {
                features: vec![],
                thresholds: vec![],
                deltas: vec![],
                bias: -0.5,
            },
            3,
        );
        let coefficients = graph
            .initializer
            .iter()
            .find(|t| t.name == "coefficients")
            .unwrap();
        assert_eq!(coefficients.float_data, vec![0.0; 3]);
        let intercept = graph.initializer.iter().find(|t| t.name == "intercept").unwrap();
        assert_eq!(intercept.float_data, vec![-0.5]);
    }

    #[test]
    fn test_unrestricted_config_records_empty_feature_list() {
        let (x, y) = features();
        let classifier = LogisticRegression::fit(&LogisticConfig::default(), &x, &y).unwrap();
        let model = build_model(&classifier, &ModelConfig::default(), 2);
        let metadata = ArtifactMetadata::from_model(&model);
        assert!(metadata.feature_names.is_empty());
    }
}
