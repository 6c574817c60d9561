use serde::{Deserialize, Serialize};

/// Placeholders recognised in an instruction template.
pub const ROLE_PLACEHOLDER: &str = "{role}";
pub const COMPANY_PLACEHOLDER: &str = "{company}";
pub const EXPERIENCE_PLACEHOLDER: &str = "{experience}";

pub const DEFAULT_INSTRUCTIONS_TEMPLATE: &str = r#"You are a professional, senior technical interviewer from {company}.
You are interviewing a candidate for a {role} position with {experience} of experience.
Your goal is to conduct a realistic, high-pressure yet fair mock interview.

Rules:
1. Start by introducing yourself and asking the first question (e.g., "Tell me about yourself").
2. Ask one question at a time.
3. Wait for the user to finish their response before asking a follow-up or a new question.
4. Listen carefully to their answers. If they are vague, ask for specific examples (STAR method).
5. You can see the candidate via their camera. Use this to note their body language or if they look like they are reading.
6. Provide helpful, constructive feedback at the VERY END of the interview if the candidate asks for it, but stay in character during the session.
7. Be encouraging but professional."#;

/// Who the candidate is interviewing with. Fixed for the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewConfig {
    pub role: String,
    pub company: String,
    pub experience: String,
}

impl InterviewConfig {
    pub fn new(role: &str, company: &str, experience: &str) -> Self {
        Self {
            role: role.to_string(),
            company: company.to_string(),
            experience: experience.to_string(),
        }
    }

    /// System instructions for the remote session, from the built-in template.
    pub fn system_instruction(&self) -> String {
        self.render(DEFAULT_INSTRUCTIONS_TEMPLATE)
    }

    /// Fills the `{role}`, `{company}` and `{experience}` placeholders of `template`.
    pub fn render(&self, template: &str) -> String {
        template
            .replace(ROLE_PLACEHOLDER, &self.role)
            .replace(COMPANY_PLACEHOLDER, &self.company)
            .replace(EXPERIENCE_PLACEHOLDER, &self.experience)
    }
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self::new("Senior Frontend Engineer", "Google", "5 years")
    }
}
