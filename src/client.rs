//! Weather assistant front end: wires a model backend to a tool session and
//! runs queries interactively or from the built-in demo script.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::agent::{DispatchOutcome, Dispatcher, QueryRun};
use crate::llm::{to_provider_format, ModelBackend, ProviderToolSpec};
use crate::tools::{bootstrap, ToolDescriptor, ToolError, ToolSession};

/// Queries run by demo mode, in order.
pub const DEMO_QUERIES: [&str; 3] = [
    "What's the current weather in San Francisco?",
    "Give me a 5-day forecast for Tokyo",
    "What's the weather at coordinates 51.5074, -0.1278?",
];

const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// A connected weather assistant.
pub struct WeatherAgent {
    backend: Box<dyn ModelBackend>,
    session: Box<dyn ToolSession>,
    tools: Vec<ToolDescriptor>,
    tool_spec: ProviderToolSpec,
}

impl WeatherAgent {
    /// Enumerate the session's tools and prepare them for the backend.
    pub async fn connect(
        backend: Box<dyn ModelBackend>,
        session: Box<dyn ToolSession>,
    ) -> Result<Self, ToolError> {
        let tools = bootstrap(session.as_ref()).await?;
        let tool_spec = to_provider_format(backend.tool_format(), &tools);

        info!(
            backend = backend.name(),
            tools = tools.len(),
            "weather agent ready"
        );

        Ok(Self {
            backend,
            session,
            tools,
            tool_spec,
        })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Run one query to completion.
    pub async fn answer(&self, query: &str) -> QueryRun {
        Dispatcher::new(
            self.backend.as_ref(),
            self.session.as_ref(),
            &self.tools,
            &self.tool_spec,
        )
        .run(query)
        .await
    }

    /// Read queries line by line until EOF or a quit word.
    pub async fn run_interactive<R, W>(&self, input: R, output: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let tool_names: Vec<_> = self.tools().iter().map(|t| t.name.as_str()).collect();
        output
            .write_all(
                format!(
                    "Weather Assistant ({})\nTools: {}\nAsk about the weather anywhere. Type 'quit' to exit.\n\n",
                    self.backend_name(),
                    tool_names.join(", ")
                )
                .as_bytes(),
            )
            .await?;

        let mut lines = input.lines();
        loop {
            output.write_all(b"You: ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                output.write_all(b"\n").await?;
                break;
            };

            let query = line.trim();
            if query.is_empty() {
                continue;
            }
            if is_quit_word(query) {
                break;
            }

            let run = self.answer(query).await;
            output
                .write_all(format!("\nAssistant: {}\n\n", render_outcome(&run.outcome)).as_bytes())
                .await?;
        }

        output.write_all(b"Goodbye!\n").await?;
        output.flush().await
    }

    /// Run [`DEMO_QUERIES`] in order, pausing after each answer.
    pub async fn run_demo<W>(&self, output: &mut W, pause: Duration) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        output
            .write_all(format!("Weather Assistant demo ({})\n\n", self.backend_name()).as_bytes())
            .await?;

        for query in DEMO_QUERIES {
            output.write_all(format!("Query: {}\n", query).as_bytes()).await?;
            output.flush().await?;

            let run = self.answer(query).await;
            output
                .write_all(format!("Response: {}\n\n", render_outcome(&run.outcome)).as_bytes())
                .await?;
            output.flush().await?;

            tokio::time::sleep(pause).await;
        }

        Ok(())
    }
}

/// Text shown to the user for a finished query.
pub fn render_outcome(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::FinalAnswer(text) => text.clone(),
        DispatchOutcome::IterationBudgetExceeded => "Max iterations reached".to_string(),
        DispatchOutcome::Error(reason) => format!("Error processing query: {}", reason),
    }
}

fn is_quit_word(line: &str) -> bool {
    QUIT_WORDS.iter().any(|w| line.eq_ignore_ascii_case(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::agent::{ConversationState, Turn};
    use crate::llm::{BackendError, ModelStep, ToolFormat};
    use crate::tools::Arguments;

    /// Answers every query by echoing the user's text.
    struct EchoBackend {
        queries: Mutex<Vec<String>>,
    }

    impl EchoBackend {
        fn new() -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn tool_format(&self) -> ToolFormat {
            ToolFormat::OpenAi
        }

        async fn next_step(
            &self,
            conversation: &ConversationState,
            tools: &ProviderToolSpec,
        ) -> Result<ModelStep, BackendError> {
            assert_eq!(tools.format(), ToolFormat::OpenAi);
            match conversation.turns().first() {
                Some(Turn::UserText(q)) => {
                    self.queries.lock().unwrap().push(q.clone());
                    Ok(ModelStep::Final(format!("echo: {}", q)))
                }
                _ => Err(BackendError::EmptyResponse),
            }
        }
    }

    struct FixedSession(Vec<ToolDescriptor>);

    #[async_trait]
    impl ToolSession for FixedSession {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
            Ok(self.0.clone())
        }

        async fn call_tool(&self, name: &str, _arguments: &Arguments) -> Result<String, ToolError> {
            Ok(format!("{} ok", name))
        }
    }

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "", vec![], vec![]).unwrap()
    }

    async fn agent() -> WeatherAgent {
        let session = FixedSession(vec![descriptor("get_current_weather"), descriptor("get_forecast")]);
        tokio_test::assert_ok!(WeatherAgent::connect(Box::new(EchoBackend::new()), Box::new(session)).await)
    }

    #[test]
    fn renders_each_outcome() {
        assert_eq!(render_outcome(&DispatchOutcome::FinalAnswer("Sunny".into())), "Sunny");
        assert_eq!(
            render_outcome(&DispatchOutcome::IterationBudgetExceeded),
            "Max iterations reached"
        );
        assert_eq!(
            render_outcome(&DispatchOutcome::Error("Received empty response".into())),
            "Error processing query: Received empty response"
        );
    }

    #[tokio::test]
    async fn connect_prepares_tools_for_backend() {
        let agent = agent().await;
        assert_eq!(agent.tools().len(), 2);
        assert_eq!(agent.tool_spec.format(), ToolFormat::OpenAi);
        assert_eq!(agent.tool_spec.declarations().len(), 2);
    }

    #[tokio::test]
    async fn connect_rejects_duplicate_tools() {
        let session = FixedSession(vec![descriptor("get_forecast"), descriptor("get_forecast")]);
        let result = WeatherAgent::connect(Box::new(EchoBackend::new()), Box::new(session)).await;
        assert!(matches!(result, Err(ToolError::InvalidDescriptor(_))));
    }

    #[tokio::test]
    async fn interactive_skips_blank_lines_and_stops_on_quit() {
        let agent = agent().await;
        let input: &[u8] = b"Weather in Oslo?\n\n   \nQUIT\nnever asked\n";
        let mut output = Vec::new();

        agent.run_interactive(input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Tools: get_current_weather, get_forecast\n"));
        assert!(text.contains("Assistant: echo: Weather in Oslo?"));
        assert!(!text.contains("never asked"));
        assert_eq!(text.matches("Assistant:").count(), 1);
        assert!(text.ends_with("Goodbye!\n"));
    }

    #[tokio::test]
    async fn interactive_ends_at_eof() {
        let agent = agent().await;
        let input: &[u8] = b"first\nsecond";
        let mut output = Vec::new();

        agent.run_interactive(input, &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("Assistant: echo: first"));
        assert!(text.contains("Assistant: echo: second"));
    }

    #[test]
    fn quit_words_are_case_insensitive() {
        assert!(is_quit_word("exit"));
        assert!(is_quit_word("Q"));
        assert!(is_quit_word("Quit"));
        assert!(!is_quit_word("quite"));
    }

    #[tokio::test]
    async fn demo_runs_three_queries_in_order() {
        let backend = EchoBackend::new();
        let session = FixedSession(vec![descriptor("get_current_weather")]);
        let agent = WeatherAgent::connect(Box::new(backend), Box::new(session))
            .await
            .unwrap();
        let mut output = Vec::new();

        agent.run_demo(&mut output, Duration::ZERO).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Query: ").count(), 3);
        let positions: Vec<_> = DEMO_QUERIES
            .iter()
            .map(|q| text.find(&format!("Response: echo: {}", q)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
