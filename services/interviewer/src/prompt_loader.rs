use anyhow::{Context, Result};
use interview_core::interview::{COMPANY_PLACEHOLDER, EXPERIENCE_PLACEHOLDER, ROLE_PLACEHOLDER};
use std::fs;
use std::path::Path;

/// Loads an interviewer instruction template. The template may use the
/// `{role}`, `{company}` and `{experience}` placeholders.
pub fn load_template(path: &Path) -> Result<String> {
    let template = fs::read_to_string(path)
        .with_context(|| format!("Failed to read instructions file: {}", path.display()))?;
    if template.trim().is_empty() {
        anyhow::bail!("Instructions file is empty: {}", path.display());
    }

    let placeholders = [ROLE_PLACEHOLDER, COMPANY_PLACEHOLDER, EXPERIENCE_PLACEHOLDER];
    if !placeholders.iter().any(|p| template.contains(p)) {
        tracing::warn!(
            "Instructions file {} uses none of {:?}; the interview settings will not reach the model",
            path.display(),
            placeholders
        );
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::interview::InterviewConfig;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_load_template_successfully() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("interviewer.md");
        let mut file = File::create(&path)?;
        // The `{{...}}` in `writeln!` escapes the braces, so `{role}` is written to the file.
        writeln!(file, "Interview for {{role}} at {{company}}.")?;

        let template = load_template(&path)?;
        assert_eq!(template, "Interview for {role} at {company}.\n");

        let config = InterviewConfig::new("Data Engineer", "Initech", "2 years");
        assert_eq!(
            config.render(&template),
            "Interview for Data Engineer at Initech.\n"
        );
        Ok(())
    }

    #[test]
    fn test_load_template_from_nonexistent_file() {
        let result = load_template(Path::new("nonexistent_instructions_for_testing.md"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_template_rejects_empty_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.md");
        File::create(&path)?;
        assert!(load_template(&path).is_err());
        Ok(())
    }
}
