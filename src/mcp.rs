use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use signin_agent::{Agent, LaunchOptions, PageDocument, Profile, Request};

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct OpenRequest {
    #[schemars(description = "Sign-in page URL to open")]
    pub url: String,
}

#[derive(Deserialize, schemars::JsonSchema)]
pub struct CredentialsRequest {
    #[schemars(description = "Account name typed at the username step")]
    pub username: String,
    #[schemars(description = "Password typed at the password step")]
    pub password: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct DispatchRequest {
    #[schemars(description = "Step label exactly as returned by current_step_label")]
    pub label: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SelectorRequest {
    #[schemars(description = "CSS selector; the first match is used")]
    pub selector: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ButtonTextRequest {
    #[schemars(description = "Exact visible text (trimmed) or value of the button")]
    pub text: String,
}

#[derive(Deserialize, schemars::JsonSchema)]
pub struct TypeRequest {
    #[schemars(description = "CSS selector of the input")]
    pub selector: String,
    #[schemars(description = "Text to type, one character at a time")]
    pub value: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct WaitForRequest {
    #[schemars(description = "CSS selector to wait for")]
    pub selector: String,
    #[schemars(description = "Timeout in milliseconds (default 5000)")]
    pub timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

#[derive(Clone)]
pub struct SigninServer {
    agent: Arc<Mutex<Option<Agent<PageDocument>>>>,
    profile: Profile,
    launch: LaunchOptions,
    tool_router: ToolRouter<Self>,
}

impl SigninServer {
    /// Run one boundary request against the open page.
    async fn call(&self, request: Request) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.agent.lock().await;
        let agent = guard.as_mut().ok_or_else(|| {
            ErrorData::internal_error("No page open. Use open first.", None::<Value>)
        })?;
        let envelope = agent.call(request).await;
        text_ok(envelope.to_json())
    }
}

#[tool_router]
impl SigninServer {
    pub fn new(profile: Profile, launch: LaunchOptions) -> Self {
        Self {
            agent: Arc::new(Mutex::new(None)),
            profile,
            launch,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Open a sign-in page. Launches the browser on first call and installs the agent; credentials survive navigation."
    )]
    async fn open(&self, req: Parameters<OpenRequest>) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.agent.lock().await;
        if guard.is_none() {
            let document = PageDocument::launch(self.launch.clone())
                .await
                .map_err(err)?;
            *guard = Some(Agent::new(document, self.profile.clone()));
        }
        let agent = guard
            .as_ref()
            .ok_or_else(|| err("browser failed to start"))?;
        agent.document().goto(&req.0.url).await.map_err(err)?;
        let url = agent.document().url().await.map_err(err)?;
        text_ok(format!("Opened: {}\n{}", url, agent.ready().await.to_json()))
    }

    #[tool(description = "Store the username and password used by dispatch.")]
    async fn set_credentials(
        &self,
        req: Parameters<CredentialsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let Parameters(CredentialsRequest { username, password }) = req;
        self.call(Request::SetCredentials { username, password })
            .await
    }

    #[tool(
        description = "Perform the action for a step label: type the username or password, or press the step's button. NO_HANDLER (2) for unknown labels."
    )]
    async fn dispatch(&self, req: Parameters<DispatchRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::Dispatch { label: req.0.label }).await
    }

    #[tool(description = "Check whether an element matches the selector.")]
    async fn exists(&self, req: Parameters<SelectorRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::Exists {
            selector: req.0.selector,
        })
        .await
    }

    #[tool(description = "Click the first element matching the selector.")]
    async fn click(&self, req: Parameters<SelectorRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::Click {
            selector: req.0.selector,
        })
        .await
    }

    #[tool(description = "Click the first button whose visible text or value equals the text.")]
    async fn click_by_visible_text(
        &self,
        req: Parameters<ButtonTextRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        self.call(Request::ClickByVisibleText { text: req.0.text })
            .await
    }

    #[tool(
        description = "Clear an input and type text character by character, firing input and change events."
    )]
    async fn type_text(&self, req: Parameters<TypeRequest>) -> Result<CallToolResult, ErrorData> {
        let Parameters(TypeRequest { selector, value }) = req;
        self.call(Request::Type { selector, value }).await
    }

    #[tool(description = "Trimmed text content of the first matching element.")]
    async fn get_text(&self, req: Parameters<SelectorRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::GetText {
            selector: req.0.selector,
        })
        .await
    }

    #[tool(description = "Current value of the first matching element.")]
    async fn get_value(&self, req: Parameters<SelectorRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::GetValue {
            selector: req.0.selector,
        })
        .await
    }

    #[tool(description = "Wait until an element matches the selector. TIMEOUT (4) when it never does.")]
    async fn wait_for(&self, req: Parameters<WaitForRequest>) -> Result<CallToolResult, ErrorData> {
        self.call(Request::WaitFor {
            selector: req.0.selector,
            timeout_ms: req.0.timeout_ms,
        })
        .await
    }

    #[tool(description = "Read the label of the sign-in step the page currently shows.")]
    async fn current_step_label(&self) -> Result<CallToolResult, ErrorData> {
        self.call(Request::CurrentStepLabel).await
    }

    #[tool(description = "List the visible labels of all buttons on the page.")]
    async fn list_buttons(&self) -> Result<CallToolResult, ErrorData> {
        self.call(Request::ListButtons).await
    }

    #[tool(description = "Report whether the page-side agent support is installed.")]
    async fn ready(&self) -> Result<CallToolResult, ErrorData> {
        self.call(Request::Ready).await
    }

    #[tool(description = "Close the browser and release resources.")]
    async fn close(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.agent.lock().await;
        if let Some(agent) = guard.take() {
            agent.into_document().close().await.map_err(err)?;
        }
        text_ok("Browser closed.")
    }
}

#[tool_handler]
impl ServerHandler for SigninServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "signin-agent".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Sign-in automation server. Use 'open' to load a login page and 'set_credentials' \
                 once. Then loop: 'wait_for' a step title, 'current_step_label', 'dispatch' the \
                 label. Results are JSON envelopes with code 0 SUCCESS, 1 EXCEPTION, 2 NO_HANDLER, \
                 3 NOT_FOUND, 4 TIMEOUT. 'list_buttons' helps with unknown steps."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(profile: Profile, launch: LaunchOptions) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    info!("serving profile '{}' over stdio", profile.name);
    let server = SigninServer::new(profile, launch);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
