#![allow(dead_code)]

use radwatch_classifiers::{ClassifierConfig, ModelRegistry, TrainedModel};
use radwatch_core::{ArtifactKind, Label, ModelId};
use radwatch_ops::{InstallOutcome, MemoryStore, ModelInstaller};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Two-dimensional embeddings: radical terms near (1, 1), neutral ones near (-1, -1)
pub const EMBEDDINGS: &str = "\
jihad 1.0 0.9
kafir 0.9 1.0
bom 1.0 1.0
perang 0.8 1.0
teror 1.0 0.8
serang 0.9 0.9
kopi -1.0 -0.9
bola -0.9 -1.0
buku -1.0 -1.0
nasi -0.8 -1.0
lagu -1.0 -0.8
";

pub const LEXICON_YAML: &str = "bias: -2.0\nterms:\n  jihad: 2.5\n  kafir: 2.0\n  bom: 2.0\n";

pub const RADICAL_TEXTS: [&str; 5] = [
    "jihad melawan kafir",
    "bom dan teror",
    "serang perang",
    "kafir harus diserang jihad",
    "teror bom perang",
];

pub const NEUTRAL_TEXTS: [&str; 5] = [
    "minum kopi pagi",
    "main bola sore",
    "baca buku baru",
    "makan nasi goreng",
    "dengar lagu bagus",
];

pub struct Fixture {
    pub dir: TempDir,
    pub config: ClassifierConfig,
    pub registry: Arc<ModelRegistry>,
    pub installer: Arc<ModelInstaller>,
    pub store: Arc<MemoryStore>,
}

impl Fixture {
    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.path("datasets")
    }

    pub fn write_dataset(&self, name: &str, content: &str) {
        std::fs::write(self.datasets_dir().join(name), content).unwrap();
    }

    /// Fit every vector model on clean blobs and write it where the registry looks
    pub fn install_vector_models(&self) {
        let (samples, labels) = blobs(10);
        for id in ModelId::ALL.into_iter().filter(|id| id.is_trainable()) {
            let mut model = TrainedModel::for_model(id).unwrap();
            model.fit(&samples, &labels).unwrap();
            std::fs::write(
                self.config.artifact_path(ArtifactKind::from(id)),
                model.to_json().unwrap(),
            )
            .unwrap();
        }
    }

    pub fn install_lexicon(&self) {
        let dir = self.config.artifact_path(ArtifactKind::Lexicon);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lexicon.yaml"), LEXICON_YAML).unwrap();
    }

    /// Every model on disk and loaded
    pub fn with_all_models(self) -> Self {
        self.install_vector_models();
        self.install_lexicon();
        self.registry.reload();
        self
    }
}

/// Workspace with an embedding table, empty models and datasets directories
pub fn fixture() -> Fixture {
    fixture_with_store(MemoryStore::new())
}

pub fn fixture_with_store(store: MemoryStore) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = ClassifierConfig::with_models_dir(dir.path().join("models"));
    std::fs::create_dir_all(&config.models_dir).unwrap();
    std::fs::create_dir_all(dir.path().join("datasets")).unwrap();
    std::fs::write(&config.embedding_path, EMBEDDINGS).unwrap();

    let registry = Arc::new(ModelRegistry::new(config.clone()));
    registry.load_all();
    let installer = Arc::new(ModelInstaller::new(config.clone(), registry.clone()));

    Fixture {
        dir,
        config,
        registry,
        installer,
        store: Arc::new(store),
    }
}

pub fn blobs(n_per_class: usize) -> (Vec<Vec<f32>>, Vec<Label>) {
    let mut samples = Vec::new();
    let mut labels = Vec::new();
    for i in 0..n_per_class {
        let jitter = (i % 4) as f32 * 0.05;
        samples.push(vec![0.9 + jitter, 1.0 - jitter]);
        labels.push(Label::Radical);
        samples.push(vec![-0.9 - jitter, -1.0 + jitter]);
        labels.push(Label::NonRadical);
    }
    (samples, labels)
}

/// CSV with `rows` rows per class, labelled with the given spellings in turn
pub fn labelled_csv(rows: usize, radical: &[&str], non_radical: &[&str]) -> String {
    let mut csv = String::from("text,label\n");
    for i in 0..rows {
        csv.push_str(&format!(
            "\"{}\",{}\n",
            RADICAL_TEXTS[i % RADICAL_TEXTS.len()],
            radical[i % radical.len()]
        ));
        csv.push_str(&format!(
            "\"{}\",{}\n",
            NEUTRAL_TEXTS[i % NEUTRAL_TEXTS.len()],
            non_radical[i % non_radical.len()]
        ));
    }
    csv
}

/// Write a ZIP holding `files`; names ending in `/` become directories
pub fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();
    for (name, contents) in files {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
    }
    zip.finish().unwrap();
}

pub fn is_pending(outcome: &InstallOutcome) -> bool {
    matches!(outcome, InstallOutcome::PendingRestart { .. })
}
