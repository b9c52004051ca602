// ============================================================
// Layer 4 — Dataset Loader
// ============================================================
// Reads SQuAD-style question-answering records from disk and
// turns them into domain Examples.
//
// Expected layout of the data path:
//   data/
//     train.json  | train.jsonl        ← required
//     validation.json | .jsonl         ← optional eval split
//     test.json  | test.jsonl          ← used if no validation
//
// A data path that is a single file is read as the train
// split with no eval split.
//
// Record format (one object per record; .json holds an
// array, .jsonl holds one object per line):
//   {
//     "question": "When is the ceremony?",
//     "context":  "The ceremony is on 15 April 2026.",
//     "answers":  { "text": ["15 April 2026"], "answer_start": [19] }
//   }
// Empty `answers` lists mark an unanswerable question. Only
// the first answer is used.
//
// Reference: Rajpurkar et al. (2018) SQuAD 2.0
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::example::{Answer, Example};

/// Answer columns as stored in the dataset
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerColumns {
    #[serde(default)]
    pub text:         Vec<String>,
    #[serde(default)]
    pub answer_start: Vec<usize>,
}

/// One raw dataset record
#[derive(Debug, Clone, Deserialize)]
pub struct SquadRecord {
    pub question: String,
    pub context:  String,
    #[serde(default)]
    pub answers:  AnswerColumns,
}

impl From<SquadRecord> for Example {
    fn from(r: SquadRecord) -> Self {
        let answer = match (r.answers.text.into_iter().next(), r.answers.answer_start.first()) {
            (Some(text), Some(&start)) => Some(Answer::new(text, start)),
            _ => None,
        };
        Example { question: r.question, context: r.context, answer }
    }
}

/// Train split plus an optional evaluation split
#[derive(Debug, Clone, Default)]
pub struct DatasetSplits {
    pub train: Vec<Example>,
    pub eval:  Option<Vec<Example>>,
}

impl DatasetSplits {
    /// Every example of every split, for whole-dataset statistics
    pub fn all(&self) -> impl Iterator<Item = &Example> {
        self.train.iter().chain(self.eval.iter().flatten())
    }
}

/// Loads dataset splits from a directory or a single file.
pub struct SquadLoader {
    path: PathBuf,
}

impl SquadLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<DatasetSplits> {
        if self.path.is_file() {
            let train = read_records(&self.path)?;
            tracing::info!("Loaded {} training examples from '{}'", train.len(), self.path.display());
            return Ok(DatasetSplits { train, eval: None });
        }

        if !self.path.is_dir() {
            bail!("Dataset path '{}' does not exist", self.path.display());
        }

        let train_file = find_split(&self.path, "train")
            .with_context(|| format!("No train.json or train.jsonl in '{}'", self.path.display()))?;
        let train = read_records(&train_file)?;

        // validation is preferred over test, like most QA recipes
        let eval = match find_split(&self.path, "validation").or_else(|| find_split(&self.path, "test")) {
            Some(file) => Some(read_records(&file)?),
            None       => None,
        };

        tracing::info!(
            "Loaded {} training and {} evaluation examples",
            train.len(),
            eval.as_ref().map_or(0, Vec::len),
        );
        Ok(DatasetSplits { train, eval })
    }
}

/// `<dir>/<name>.json` or `<dir>/<name>.jsonl`, whichever exists
fn find_split(dir: &Path, name: &str) -> Option<PathBuf> {
    ["json", "jsonl"]
        .iter()
        .map(|ext| dir.join(format!("{name}.{ext}")))
        .find(|p| p.is_file())
}

fn read_records(path: &Path) -> Result<Vec<Example>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read dataset file '{}'", path.display()))?;

    let records: Vec<SquadRecord> = if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Malformed record on line {} of '{}'", i + 1, path.display()))
            })
            .collect::<Result<_>>()?
    } else {
        serde_json::from_str(&text)
            .with_context(|| format!("Malformed dataset file '{}'", path.display()))?
    };

    Ok(records.into_iter().map(Example::from).collect())
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    const RECORD: &str = r#"{"question":"When?","context":"On 15 April.","answers":{"text":["15 April"],"answer_start":[3]}}"#;
    const NO_ANSWER: &str = r#"{"question":"Who?","context":"Nobody.","answers":{"text":[],"answer_start":[]}}"#;

    #[test]
    fn test_record_maps_first_answer() {
        let r: SquadRecord = serde_json::from_str(RECORD).unwrap();
        let ex = Example::from(r);
        assert_eq!(ex.answer, Some(Answer::new("15 April", 3)));
    }

    #[test]
    fn test_empty_answers_mean_unanswerable() {
        let r: SquadRecord = serde_json::from_str(NO_ANSWER).unwrap();
        assert!(!Example::from(r).has_answer());
    }

    #[test]
    fn test_directory_with_validation_split() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("train.jsonl"), format!("{RECORD}\n\n{NO_ANSWER}\n")).unwrap();
        fs::write(tmp.path().join("validation.json"), format!("[{RECORD}]")).unwrap();
        fs::write(tmp.path().join("test.json"), format!("[{RECORD},{RECORD}]")).unwrap();

        let splits = SquadLoader::new(tmp.path()).load().unwrap();
        assert_eq!(splits.train.len(), 2);
        assert_eq!(splits.eval.as_ref().unwrap().len(), 1);
        assert_eq!(splits.all().count(), 3);
    }

    #[test]
    fn test_test_split_used_when_no_validation() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("train.json"), format!("[{RECORD}]")).unwrap();
        fs::write(tmp.path().join("test.json"), format!("[{RECORD},{NO_ANSWER}]")).unwrap();

        let splits = SquadLoader::new(tmp.path()).load().unwrap();
        assert_eq!(splits.eval.unwrap().len(), 2);
    }

    #[test]
    fn test_single_file_is_train_only() {
        let tmp  = tempfile::tempdir().unwrap();
        let file = tmp.path().join("data.json");
        fs::write(&file, format!("[{RECORD}]")).unwrap();

        let splits = SquadLoader::new(&file).load().unwrap();
        assert_eq!(splits.train.len(), 1);
        assert!(splits.eval.is_none());
    }

    #[test]
    fn test_missing_train_split_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(SquadLoader::new(tmp.path()).load().is_err());
        assert!(SquadLoader::new(tmp.path().join("absent")).load().is_err());
    }
}
