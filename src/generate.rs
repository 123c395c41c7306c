use crate::claude::TextGenerator;
use crate::db::SqliteExecutor;
use anyhow::Result;

const INSTRUCTIONS: &str = r#"You translate plain-language requests into SQLite statements.

Rules:
1. Reply with the statement(s) enclosed in curly braces and nothing else.
   Example: {SELECT * FROM linux WHERE distro LIKE '%a%';}
2. If the request is incomplete or ambiguous, reply with a clarifying
   question in plain text instead of a statement.
3. If the request is destructive (DELETE, DROP, ALTER), ask the user to
   confirm before replying with the statement.
4. After a clarification or confirmation, rules 1 and 2 apply again.

The tables in this database and the statements that created them:
"#;

pub struct SqlGenerator<G> {
    backend: G,
}

impl<G: TextGenerator> SqlGenerator<G> {
    pub fn new(backend: G) -> Self {
        Self { backend }
    }

    /// Turn one request into a batch of statements. An empty batch means the
    /// model answered with prose (a clarification), already shown to the
    /// user; the caller must execute nothing in that case.
    pub async fn generate(&mut self, db: &SqliteExecutor, request: &str) -> Result<Vec<String>> {
        anyhow::ensure!(!request.trim().is_empty(), "prompt cannot be empty");

        let context = context_prompt(db);
        let response = self.backend.chat(&context, request.trim()).await?;
        let batch = extract_statements(&response);

        if batch.is_empty() && !response.trim().is_empty() {
            println!("{}", response.trim());
        }

        Ok(batch)
    }

    pub fn reset(&mut self) {
        self.backend.reset();
    }
}

pub fn context_prompt(db: &SqliteExecutor) -> String {
    let mut prompt = String::from(INSTRUCTIONS);
    for (name, sql) in db.schema_context() {
        prompt.push_str(&format!("{name} - {sql}\n"));
    }
    prompt
}

/// Pull statements out of a model response. Grammar: the span from the first
/// `{` to its balanced closing `}` (a truncated response is treated as if the
/// closing brace were present), split on `;`, blank segments dropped. No
/// opening brace means the response is prose and no statement is returned.
pub fn extract_statements(response: &str) -> Vec<String> {
    let Some(start) = response.find('{') else {
        return Vec::new();
    };

    let body = &response[start + 1..];
    let mut depth = 0usize;
    let mut end = body.len();
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    end = i;
                    break;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    body[..end]
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        replies: VecDeque<String>,
        resets: usize,
    }

    impl Scripted {
        fn with(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(|s| s.to_string()).collect(),
                resets: 0,
            }
        }
    }

    impl TextGenerator for Scripted {
        async fn chat(&mut self, _context: &str, _request: &str) -> Result<String> {
            self.replies
                .pop_front()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    fn seeded() -> SqliteExecutor {
        let db = SqliteExecutor::open_in_memory(true).unwrap();
        db.execute("CREATE TABLE linux (distro TEXT)", false);
        db
    }

    #[test]
    fn extracts_single_statement() {
        assert_eq!(extract_statements("{SELECT 1;}"), vec!["SELECT 1"]);
    }

    #[test]
    fn auto_closes_truncated_response() {
        assert_eq!(extract_statements("{SELECT 1"), vec!["SELECT 1"]);
    }

    #[test]
    fn prose_yields_no_statements() {
        assert!(extract_statements("Sure, which column?").is_empty());
    }

    #[test]
    fn splits_a_batch_on_semicolons() {
        assert_eq!(
            extract_statements("{CREATE TABLE t (x INT); INSERT INTO t VALUES (1);}"),
            vec!["CREATE TABLE t (x INT)", "INSERT INTO t VALUES (1)"]
        );
    }

    #[test]
    fn braces_inside_the_span_stay_balanced() {
        assert_eq!(
            extract_statements("{UPDATE t SET j = '{\"a\": 1}';}"),
            vec!["UPDATE t SET j = '{\"a\": 1}'"]
        );
    }

    #[test]
    fn ignores_text_around_the_span() {
        assert_eq!(
            extract_statements("Here you go: {SELECT 1;} hope that helps"),
            vec!["SELECT 1"]
        );
    }

    #[test]
    fn context_prompt_lists_creation_statements() {
        let db = seeded();
        let prompt = context_prompt(&db);
        assert!(prompt.contains("curly braces"));
        assert!(prompt.contains("linux - CREATE TABLE linux"));
    }

    #[tokio::test]
    async fn generate_returns_the_extracted_batch() {
        let db = seeded();
        let mut generator = SqlGenerator::new(Scripted::with(&["{SELECT * FROM linux;}"]));
        let batch = generator.generate(&db, "show everything").await.unwrap();
        assert_eq!(batch, vec!["SELECT * FROM linux"]);
    }

    #[tokio::test]
    async fn generate_treats_prose_as_a_question() {
        let db = seeded();
        let mut generator = SqlGenerator::new(Scripted::with(&["Which table do you mean?"]));
        let batch = generator.generate(&db, "delete stuff").await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn generate_rejects_an_empty_prompt() {
        let db = seeded();
        let mut generator = SqlGenerator::new(Scripted::with(&[]));
        assert!(generator.generate(&db, "   ").await.is_err());
    }

    #[tokio::test]
    async fn reset_reaches_the_backend() {
        let mut generator = SqlGenerator::new(Scripted::with(&[]));
        generator.reset();
        assert_eq!(generator.backend.resets, 1);
    }
}
