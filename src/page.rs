//! [`Document`] over a live browser tab.
//!
//! Each operation is a single synchronous script evaluated in the page through
//! [`eoka::Page::evaluate`]: the element is resolved and acted on without the
//! page's event loop running in between. Listeners the script triggers (input,
//! click) run synchronously inside it. Typing checks after every character
//! that the target is still attached and reports [`DomError::Detached`] if a
//! listener removed it.

use eoka::{Browser, Page, StealthConfig};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::dom::{Document, DomError, DomEvent, DomResult, BUTTON_SELECTOR};
use crate::Result;

/// Page-side marker and passkey suppression.
///
/// Passkey enrollment prompts would stall the flow, so the platform
/// authenticator is reported as unavailable and `credentials.create` calls
/// carrying a `publicKey` option are rejected as if the user cancelled.
const INSTALL_JS: &str = r#"
(() => {
    const pkc = window.PublicKeyCredential;
    if (pkc) {
        try {
            Object.defineProperty(pkc, 'isUserVerifyingPlatformAuthenticatorAvailable', {
                configurable: true,
                enumerable: false,
                value: () => Promise.resolve(false)
            });
        } catch (_) {
            try { pkc.isUserVerifyingPlatformAuthenticatorAvailable = () => Promise.resolve(false); } catch (_) {}
        }
    }
    try {
        const creds = navigator.credentials;
        if (creds && typeof creds.create === 'function' && !creds.__signinPatched) {
            const create = creds.create.bind(creds);
            creds.create = (options) => (options && options.publicKey)
                ? Promise.reject(new DOMException('User cancelled', 'NotAllowedError'))
                : create(options);
            creds.__signinPatched = true;
        }
    } catch (_) {}
    window.__signinAgent = { ready: true };
    return true;
})()
"#;

const READY_JS: &str = "!!(window.__signinAgent && window.__signinAgent.ready)";

/// Browser launch settings for [`PageDocument::launch`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            proxy: None,
            user_agent: None,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl LaunchOptions {
    fn stealth(&self) -> StealthConfig {
        StealthConfig {
            headless: self.headless,
            proxy: self.proxy.clone(),
            user_agent: self.user_agent.clone(),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            ..Default::default()
        }
    }
}

/// What an element script reports back.
#[derive(Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Reply {
    fn into_result<T: DeserializeOwned>(self) -> DomResult<T> {
        if !self.ok {
            let error = self.error.unwrap_or_default();
            return Err(match self.kind.as_deref() {
                Some("missing") => DomError::NoMatch(error),
                Some("detached") => DomError::Detached,
                Some("selector") => DomError::InvalidSelector(error),
                Some("input") => DomError::NotInputCapable(error),
                _ => DomError::Script(error),
            });
        }
        serde_json::from_value(self.value).map_err(|e| DomError::Script(e.to_string()))
    }
}

/// A document backed by a browser tab, optionally owning its browser.
pub struct PageDocument {
    browser: Option<Browser>,
    page: Page,
}

impl PageDocument {
    /// Launch a browser, open a blank tab and wrap it.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        info!("launching browser (headless={})", options.headless);
        let browser = Browser::launch_with_config(options.stealth()).await?;
        let page = browser.new_page("about:blank").await?;
        Ok(Self {
            browser: Some(browser),
            page,
        })
    }

    /// Wrap a page whose browser the caller manages.
    pub fn new(page: Page) -> Self {
        Self {
            browser: None,
            page,
        }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate and install the page-side support on the new document.
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("goto: {}", url);
        self.page.goto(url).await?;
        self.install().await
    }

    /// Install the readiness marker and passkey suppression. Idempotent.
    ///
    /// Scripts do not survive navigation, so hosts call this again after the
    /// page loads a new document.
    pub async fn install(&self) -> Result<()> {
        let installed: bool = self.page.evaluate(INSTALL_JS).await?;
        debug!("install: {}", installed);
        Ok(())
    }

    pub async fn url(&self) -> Result<String> {
        Ok(self.page.url().await?)
    }

    /// Visible text of the whole page.
    pub async fn text(&self) -> Result<String> {
        Ok(self.page.text().await?)
    }

    /// PNG screenshot of the viewport.
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.page.screenshot().await?)
    }

    /// Close the owned browser, if any.
    pub async fn close(self) -> Result<()> {
        if let Some(browser) = self.browser {
            browser.close().await?;
        }
        Ok(())
    }

    /// Evaluate `body` as a function body with the helpers of [`PRELUDE_JS`]
    /// in scope. `body` must `return` a JSON-serializable value.
    async fn run<T: DeserializeOwned>(&self, body: &str) -> DomResult<T> {
        let js = format!(
            r#"(() => {{
    {prelude}
    try {{
        const value = (() => {{ {body} }})();
        return JSON.stringify({{ ok: true, value: value === undefined ? null : value }});
    }} catch (e) {{
        const kind = (e && e.kind) || (e && e.name === 'SyntaxError' ? 'selector' : 'script');
        return JSON.stringify({{ ok: false, kind, error: String(e && e.message || e) }});
    }}
}})()"#,
            prelude = PRELUDE_JS,
            body = body,
        );
        let raw: String = self
            .page
            .evaluate(&js)
            .await
            .map_err(|e| DomError::Unavailable(e.to_string()))?;
        serde_json::from_str::<Reply>(&raw)
            .map_err(|e| DomError::Script(format!("unreadable reply: {}", e)))?
            .into_result()
    }
}

/// A Rust string as a JavaScript string literal.
fn quote(s: &str) -> DomResult<String> {
    serde_json::to_string(s).map_err(|e| DomError::Script(e.to_string()))
}

/// Helpers shared by every element script.
///
/// `query` wraps selector errors so the reply names the selector rather than
/// the browser's message.
const PRELUDE_JS: &str = r#"
    const fail = (kind, message) => {
        const err = new Error(message);
        err.kind = kind;
        throw err;
    };
    const queryAll = (selector) => {
        try {
            return Array.from(document.querySelectorAll(selector));
        } catch (e) {
            fail('selector', selector);
        }
    };
    const first = (selector) => queryAll(selector)[0] || fail('missing', selector);
    const textOf = (el) => el.textContent || '';
    const valueOf = (el) => ('value' in el && typeof el.value === 'string') ? el.value : null;
    const nativeSetter = (el) => {
        const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
            : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
            : el instanceof HTMLInputElement ? HTMLInputElement.prototype
            : null;
        if (!proto) fail('input', el.tagName.toLowerCase());
        return Object.getOwnPropertyDescriptor(proto, 'value').set;
    };
"#;

impl Document for PageDocument {
    async fn count(&self, selector: &str) -> DomResult<usize> {
        self.run(&format!("return queryAll({}).length;", quote(selector)?))
            .await
    }

    async fn click(&self, selector: &str) -> DomResult<()> {
        self.run(&format!("first({}).click(); return null;", quote(selector)?))
            .await
    }

    async fn text_content(&self, selector: &str) -> DomResult<String> {
        self.run(&format!("return textOf(first({}));", quote(selector)?))
            .await
    }

    async fn value(&self, selector: &str) -> DomResult<Option<String>> {
        self.run(&format!("return valueOf(first({}));", quote(selector)?))
            .await
    }

    async fn type_text(&self, selector: &str, value: &str) -> DomResult<Option<String>> {
        let body = format!(
            r#"
    const el = first({selector});
    el.focus();
    const set = nativeSetter(el);
    set.call(el, '');
    for (const ch of {value}) {{
        set.call(el, el.value + ch);
        el.dispatchEvent(new Event('{input}', {{ bubbles: true }}));
        if (!el.isConnected) fail('detached', 'removed while typing');
    }}
    el.dispatchEvent(new Event('{change}', {{ bubbles: true }}));
    el.blur();
    return valueOf(el);
"#,
            selector = quote(selector)?,
            value = quote(value)?,
            input = DomEvent::Input.name(),
            change = DomEvent::Change.name(),
        );
        self.run(&body).await
    }

    async fn click_button(&self, text: &str) -> DomResult<bool> {
        let body = format!(
            r#"
    const text = {text};
    const button = queryAll({buttons})
        .find((el) => textOf(el).trim() === text || valueOf(el) === text);
    if (!button) return false;
    button.click();
    return true;
"#,
            text = quote(text)?,
            buttons = quote(BUTTON_SELECTOR)?,
        );
        self.run(&body).await
    }

    async fn button_labels(&self) -> DomResult<Vec<String>> {
        let body = format!(
            "return queryAll({}).map((el) => textOf(el).trim()).filter((label) => label);",
            quote(BUTTON_SELECTOR)?
        );
        self.run(&body).await
    }

    async fn first_text(&self, selectors: &[&str]) -> DomResult<Option<String>> {
        let list = serde_json::to_string(selectors).map_err(|e| DomError::Script(e.to_string()))?;
        let body = format!(
            r#"
    for (const selector of {list}) {{
        const el = queryAll(selector)[0];
        if (el) return textOf(el);
    }}
    return null;
"#
        );
        self.run(&body).await
    }

    async fn ready(&self) -> DomResult<bool> {
        self.page
            .evaluate(READY_JS)
            .await
            .map_err(|e| DomError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"[id="a"]"#).unwrap(), r#""[id=\"a\"]""#);
        assert_eq!(quote("密码").unwrap(), "\"密码\"");
    }

    #[test]
    fn test_reply_parsing() {
        let reply: Reply = serde_json::from_str(r#"{"ok":true,"value":null}"#).unwrap();
        assert!(reply.ok);
        assert!(reply.value.is_null());

        let value: Option<String> = reply.into_result().unwrap();
        assert_eq!(value, None);

        let reply = |json: &str| serde_json::from_str::<Reply>(json).unwrap();
        assert_eq!(
            reply(r##"{"ok":false,"kind":"missing","error":"#next"}"##).into_result::<()>(),
            Err(DomError::NoMatch("#next".into()))
        );
        assert_eq!(
            reply(r#"{"ok":false,"kind":"detached","error":"removed while typing"}"#)
                .into_result::<()>(),
            Err(DomError::Detached)
        );
        assert_eq!(
            reply(r#"{"ok":false,"kind":"script","error":"boom"}"#).into_result::<()>(),
            Err(DomError::Script("boom".into()))
        );
        assert_eq!(reply(r#"{"ok":true,"value":3}"#).into_result::<usize>(), Ok(3));
    }

    #[test]
    fn test_launch_options_default_viewport() {
        let stealth = LaunchOptions::default().stealth();
        assert_eq!(stealth.viewport_width, 1280);
        assert_eq!(stealth.viewport_height, 720);
        assert!(!stealth.headless);
    }
}
