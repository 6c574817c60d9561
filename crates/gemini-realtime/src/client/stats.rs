#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    total_tokens: i32,
    prompt_tokens: i32,
    response_tokens: i32,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_usage(&mut self, total: i32, prompt: i32, response: i32) {
        self.total_tokens += total;
        self.prompt_tokens += prompt;
        self.response_tokens += response;
    }

    pub fn total_tokens(&self) -> i32 {
        self.total_tokens
    }

    pub fn prompt_tokens(&self) -> i32 {
        self.prompt_tokens
    }

    pub fn response_tokens(&self) -> i32 {
        self.response_tokens
    }
}
