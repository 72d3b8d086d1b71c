use anyhow::{Context, Result, bail};
use rehearse_core::persona::Persona;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads one persona per `*.json` file in `dir_path`, ordered by file name.
pub fn load_roster(dir_path: &Path) -> Result<Vec<Persona>> {
    let mut files: Vec<PathBuf> = Vec::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read roster directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    let mut roster = Vec::with_capacity(files.len());
    for path in files {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read persona file: {}", path.display()))?;
        let persona: Persona = serde_json::from_str(&content)
            .with_context(|| format!("Invalid persona file: {}", path.display()))?;
        if roster.iter().any(|p: &Persona| p.id == persona.id) {
            bail!("Duplicate persona id '{}' in {}", persona.id, path.display());
        }
        roster.push(persona);
    }

    if roster.is_empty() {
        bail!("No persona files found in {}", dir_path.display());
    }
    Ok(roster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_persona(dir: &Path, file: &str, id: &str, name: &str) -> Result<()> {
        let mut f = File::create(dir.join(file))?;
        write!(
            f,
            r#"{{"id":"{id}","name":"{name}","role":"Interviewer","focus":"teamwork","behavior":"Calm.","voice":"Kore"}}"#
        )?;
        Ok(())
    }

    #[test]
    fn test_load_roster_sorted_by_file_name() -> Result<()> {
        let dir = tempdir()?;
        write_persona(dir.path(), "b_marcus.json", "marcus", "Marcus Lee")?;
        write_persona(dir.path(), "a_priya.json", "priya", "Priya Sharma")?;
        File::create(dir.path().join("notes.txt"))?.write_all(b"ignored")?;
        fs::create_dir(dir.path().join("nested.json"))?;

        let roster = load_roster(dir.path())?;
        let ids: Vec<&str> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["priya", "marcus"]);
        assert_eq!(roster[0].voice, "Kore");
        Ok(())
    }

    #[test]
    fn test_load_roster_rejects_bad_input() -> Result<()> {
        let dir = tempdir()?;
        assert!(load_roster(dir.path()).is_err(), "empty roster");

        File::create(dir.path().join("broken.json"))?.write_all(b"{\"id\": 3}")?;
        assert!(load_roster(dir.path()).is_err(), "malformed persona");
        Ok(())
    }

    #[test]
    fn test_load_roster_rejects_duplicate_ids() -> Result<()> {
        let dir = tempdir()?;
        write_persona(dir.path(), "one.json", "priya", "Priya Sharma")?;
        write_persona(dir.path(), "two.json", "priya", "Priya Patel")?;
        assert!(load_roster(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn test_load_roster_from_nonexistent_dir() {
        assert!(load_roster(Path::new("nonexistent_dir_for_roster_tests")).is_err());
    }
}
