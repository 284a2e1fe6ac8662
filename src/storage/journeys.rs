// Journey and step persistence operations
//
// Layout: {data_root}/.blueprint/journeys/{journey_id}.json
//
// Each file is a JourneyFile document holding the journey row plus its
// ordered step rows. Step rows are the sole continuation state for the
// two-call resume protocol: re-entering the pipeline only ever consults
// what is persisted here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{blueprint_dir, ensure_dir, read_json, write_json, FileResult, STORAGE_VERSION};
use crate::models::{Journey, JourneyStatus, JourneyStep, StepStatus};

/// On-disk journey document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneyFile {
    pub version: u32,
    pub journey: Journey,
    pub steps: Vec<JourneyStep>,
}

impl JourneyFile {
    /// Step number for the next appended step (1-based)
    pub fn next_step_number(&self) -> i32 {
        self.steps.len() as i32 + 1
    }

    pub fn last_step(&self) -> Option<&JourneyStep> {
        self.steps.last()
    }

    /// The single step awaiting user input, if any. The state machine
    /// guarantees at most one exists.
    pub fn awaiting_step(&self) -> Option<&JourneyStep> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::AwaitingSelection)
    }

    /// Most recent completed step of the given type
    pub fn completed_step(&self, step_type: crate::models::StepType) -> Option<&JourneyStep> {
        self.steps
            .iter()
            .rev()
            .find(|s| s.step_type == step_type && s.status == StepStatus::Complete)
    }
}

/// Get the journeys directory for a data root
pub fn journeys_dir(root: &Path) -> PathBuf {
    blueprint_dir(root).join("journeys")
}

fn journey_path(root: &Path, journey_id: &str) -> PathBuf {
    journeys_dir(root).join(format!("{}.json", journey_id))
}

/// Check whether a journey document exists
pub fn journey_exists(root: &Path, journey_id: &str) -> bool {
    journey_path(root, journey_id).is_file()
}

/// Persist a newly created journey with no steps yet
pub fn create_journey(root: &Path, journey: &Journey) -> FileResult<()> {
    ensure_dir(&journeys_dir(root))?;

    let path = journey_path(root, &journey.id);
    if path.exists() {
        return Err(format!("Journey '{}' already exists", journey.id));
    }

    let file = JourneyFile {
        version: STORAGE_VERSION,
        journey: journey.clone(),
        steps: Vec::new(),
    };
    write_json(&path, &file)
}

/// Load a journey document. Fails if the journey does not exist.
pub fn read_journey(root: &Path, journey_id: &str) -> FileResult<JourneyFile> {
    let path = journey_path(root, journey_id);
    if !path.is_file() {
        return Err(format!("Journey '{}' not found", journey_id));
    }
    read_json(&path)
}

/// List all journeys, most recently created first
pub fn list_journeys(root: &Path) -> FileResult<Vec<Journey>> {
    let dir = journeys_dir(root);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(&dir)
        .map_err(|e| format!("Failed to read journeys directory '{}': {}", dir.display(), e))?;

    let mut journeys = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_json::<JourneyFile>(&path) {
            Ok(file) => journeys.push(file.journey),
            Err(e) => {
                log::warn!("Skipping unreadable journey file '{}': {}", path.display(), e);
            }
        }
    }

    journeys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(journeys)
}

/// Append a step row to a journey
pub fn append_step(root: &Path, journey_id: &str, step: &JourneyStep) -> FileResult<()> {
    let mut file = read_journey(root, journey_id)?;
    if file.steps.iter().any(|s| s.id == step.id) {
        return Err(format!(
            "Step '{}' already exists in journey '{}'",
            step.id, journey_id
        ));
    }
    file.steps.push(step.clone());
    file.journey.updated_at = step.updated_at;
    write_json(&journey_path(root, journey_id), &file)
}

/// Replace an existing step row (status/output transitions)
pub fn update_step(root: &Path, journey_id: &str, step: &JourneyStep) -> FileResult<()> {
    let mut file = read_journey(root, journey_id)?;
    let slot = file
        .steps
        .iter_mut()
        .find(|s| s.id == step.id)
        .ok_or_else(|| format!("Step '{}' not found in journey '{}'", step.id, journey_id))?;
    *slot = step.clone();
    file.journey.updated_at = step.updated_at;
    write_json(&journey_path(root, journey_id), &file)
}

/// Update a journey's status
pub fn update_journey_status(
    root: &Path,
    journey_id: &str,
    status: JourneyStatus,
) -> FileResult<()> {
    let mut file = read_journey(root, journey_id)?;
    file.journey.status = status;
    file.journey.updated_at = chrono::Utc::now();
    write_json(&journey_path(root, journey_id), &file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntentType, StepType};
    use tempfile::TempDir;

    fn sample_journey() -> Journey {
        Journey::new(IntentType::Build, "a note-taking app for students")
    }

    fn sample_step(journey: &Journey, number: i32) -> JourneyStep {
        JourneyStep::new(
            &journey.id,
            StepType::Classify,
            number,
            StepStatus::Running,
            serde_json::json!({"prompt": "a note-taking app for students"}),
        )
    }

    #[test]
    fn test_create_and_read_journey() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();

        create_journey(temp.path(), &journey).unwrap();
        assert!(journey_exists(temp.path(), &journey.id));

        let file = read_journey(temp.path(), &journey.id).unwrap();
        assert_eq!(file.version, STORAGE_VERSION);
        assert_eq!(file.journey, journey);
        assert!(file.steps.is_empty());
        assert_eq!(file.next_step_number(), 1);
    }

    #[test]
    fn test_create_duplicate_journey_fails() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();

        create_journey(temp.path(), &journey).unwrap();
        let result = create_journey(temp.path(), &journey);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("already exists"));
    }

    #[test]
    fn test_read_missing_journey() {
        let temp = TempDir::new().unwrap();
        let result = read_journey(temp.path(), "nope");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not found"));
    }

    #[test]
    fn test_append_and_update_step() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();
        create_journey(temp.path(), &journey).unwrap();

        let mut step = sample_step(&journey, 1);
        append_step(temp.path(), &journey.id, &step).unwrap();

        let file = read_journey(temp.path(), &journey.id).unwrap();
        assert_eq!(file.steps.len(), 1);
        assert_eq!(file.next_step_number(), 2);
        assert_eq!(file.last_step().unwrap().id, step.id);

        step.complete_with(serde_json::json!({"intent": "build"}));
        update_step(temp.path(), &journey.id, &step).unwrap();

        let file = read_journey(temp.path(), &journey.id).unwrap();
        assert_eq!(file.steps[0].status, StepStatus::Complete);
        assert!(file.steps[0].output.is_some());
    }

    #[test]
    fn test_append_duplicate_step_fails() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();
        create_journey(temp.path(), &journey).unwrap();

        let step = sample_step(&journey, 1);
        append_step(temp.path(), &journey.id, &step).unwrap();
        let result = append_step(temp.path(), &journey.id, &step);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_unknown_step_fails() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();
        create_journey(temp.path(), &journey).unwrap();

        let step = sample_step(&journey, 1);
        let result = update_step(temp.path(), &journey.id, &step);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("not found"));
    }

    #[test]
    fn test_awaiting_step_lookup() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();
        create_journey(temp.path(), &journey).unwrap();

        let mut classify = sample_step(&journey, 1);
        classify.complete_with(serde_json::json!({"intent": "build"}));
        append_step(temp.path(), &journey.id, &classify).unwrap();

        let clarify = JourneyStep::new(
            &journey.id,
            StepType::Clarify,
            2,
            StepStatus::AwaitingSelection,
            serde_json::json!({"questions": []}),
        );
        append_step(temp.path(), &journey.id, &clarify).unwrap();

        let file = read_journey(temp.path(), &journey.id).unwrap();
        let awaiting = file.awaiting_step().unwrap();
        assert_eq!(awaiting.step_type, StepType::Clarify);
        assert_eq!(
            file.completed_step(StepType::Classify).map(|s| s.id.clone()),
            Some(classify.id)
        );
    }

    #[test]
    fn test_list_journeys_sorted_newest_first() {
        let temp = TempDir::new().unwrap();

        let mut first = sample_journey();
        first.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
        let second = sample_journey();

        create_journey(temp.path(), &first).unwrap();
        create_journey(temp.path(), &second).unwrap();

        let listed = list_journeys(temp.path()).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[test]
    fn test_list_journeys_empty_root() {
        let temp = TempDir::new().unwrap();
        let listed = list_journeys(temp.path()).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_update_journey_status() {
        let temp = TempDir::new().unwrap();
        let journey = sample_journey();
        create_journey(temp.path(), &journey).unwrap();

        update_journey_status(temp.path(), &journey.id, JourneyStatus::Completed).unwrap();
        let file = read_journey(temp.path(), &journey.id).unwrap();
        assert_eq!(file.journey.status, JourneyStatus::Completed);
        assert!(file.journey.updated_at >= journey.updated_at);
    }
}
