//! Integration tests against a real browser.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test browser -- --ignored

use signin_agent::{Agent, Document, ErrorKind, LaunchOptions, PageDocument, Profile};

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

async fn open(html: &str) -> PageDocument {
    let document = PageDocument::launch(LaunchOptions {
        headless: true,
        ..Default::default()
    })
    .await
    .expect("Failed to launch browser");
    document
        .goto(&format!("data:text/html;charset=utf-8,{}", html))
        .await
        .expect("Failed to navigate");
    document
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_install_sets_ready() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let document = open("<p>hello</p>").await;
    assert!(document.ready().await.unwrap());

    let agent = Agent::new(document, Profile::builtin("en-US").unwrap());
    assert_eq!(agent.ready().await.ready, Some(true));
    agent.into_document().close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_type_reaches_input_listener() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    // The listener mirrors each input event into #mirror, like a bound model would.
    let document = open(
        r#"
        <h1 data-testid="title">Sign in</h1>
        <input id="usernameEntry">
        <p id="mirror"></p>
        <button onclick="document.title='clicked'">Next</button>
        <script>
          const input = document.getElementById('usernameEntry');
          input.addEventListener('input', () => {
            document.getElementById('mirror').textContent = input.value;
          });
        </script>
    "#,
    )
    .await;

    let mut agent = Agent::new(document, Profile::builtin("en-US").unwrap());
    agent.set_credentials("爱丽丝", "secret");

    let label = agent.current_step_label().await;
    assert_eq!(label.title.as_deref(), Some("Sign in"));

    let result = agent.dispatch("Sign in").await;
    assert_eq!(result.code, ErrorKind::Success, "{}", result);

    let mirrored = agent.get_text("#mirror").await;
    assert_eq!(mirrored.text.as_deref(), Some("爱丽丝"));

    let title: String = agent
        .document()
        .page()
        .evaluate("document.title")
        .await
        .unwrap();
    assert_eq!(title, "clicked");

    agent.into_document().close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_missing_and_invalid_selectors() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let document = open("<div id='x'>x</div>").await;
    let agent = Agent::new(document, Profile::builtin("en-US").unwrap());

    assert_eq!(agent.exists("#x").await.code, ErrorKind::Success);
    assert_eq!(agent.exists("#nope").await.code, ErrorKind::NotFound);
    assert_eq!(agent.exists("div[").await.code, ErrorKind::Exception);
    assert_eq!(agent.get_value("#x").await.value, None);

    agent.into_document().close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_step_label_and_buttons_on_legacy_page() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let document = open(
        r#"
        <div id="appConfirmPageTitle" class="text-title"> Allow access </div>
        <button> Yes </button>
        <div role="button">No</div>
        <button>   </button>
        <input type="submit" value="Go">
    "#,
    )
    .await;
    let agent = Agent::new(document, Profile::builtin("en-US").unwrap());

    let label = agent.current_step_label().await;
    assert_eq!(label.title.as_deref(), Some("Allow access"));

    let buttons = agent.list_buttons().await;
    assert_eq!(buttons.buttons, Some(vec!["Yes".to_string(), "No".to_string()]));

    assert_eq!(agent.click_by_visible_text("No").await.code, ErrorKind::Success);
    assert_eq!(
        agent.click_by_visible_text("Go").await.code,
        ErrorKind::NotFound
    );

    agent.into_document().close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_click_by_visible_text_while_buttons_rotate() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    // The bar moves its first button to the end on every timer tick.
    let document = open(
        r#"
        <div id="bar">
          <button onclick="window.clicked += 'Back;'">Back</button>
          <button onclick="window.clicked += 'Next;'">Next</button>
          <button onclick="window.clicked += 'Cancel;'">Cancel</button>
        </div>
        <script>
          window.clicked = '';
          const bar = document.getElementById('bar');
          setInterval(() => bar.appendChild(bar.firstElementChild), 1);
        </script>
    "#,
    )
    .await;
    let agent = Agent::new(document, Profile::builtin("en-US").unwrap());

    for _ in 0..20 {
        let result = agent.click_by_visible_text("Next").await;
        assert_eq!(result.code, ErrorKind::Success, "{}", result);
        tokio::time::sleep(std::time::Duration::from_millis(3)).await;
    }

    let mut labels = agent.list_buttons().await.buttons.unwrap();
    labels.sort();
    assert_eq!(labels, ["Back", "Cancel", "Next"]);

    let clicked: String = agent
        .document()
        .page()
        .evaluate("window.clicked")
        .await
        .unwrap();
    assert_eq!(clicked, "Next;".repeat(20));

    agent.into_document().close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_dispatch_when_typing_inserts_buttons() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    // Every keystroke puts a fresh Cancel button in front of Next.
    let document = open(
        r#"
        <h1 data-testid="title">Sign in</h1>
        <input id="usernameEntry">
        <button onclick="window.clicked += 'Next;'">Next</button>
        <script>
          window.clicked = '';
          document.getElementById('usernameEntry').addEventListener('input', () => {
            const cancel = document.createElement('button');
            cancel.textContent = 'Cancel';
            cancel.onclick = () => { window.clicked += 'Cancel;'; };
            document.body.prepend(cancel);
          });
        </script>
    "#,
    )
    .await;
    let mut agent = Agent::new(document, Profile::builtin("en-US").unwrap());
    agent.set_credentials("alice", "secret");

    let result = agent.dispatch("Sign in").await;
    assert_eq!(result.code, ErrorKind::Success, "{}", result);

    let buttons = agent.list_buttons().await.buttons.unwrap();
    assert_eq!(buttons.len(), 6);
    assert_eq!(buttons.last().map(String::as_str), Some("Next"));

    let clicked: String = agent
        .document()
        .page()
        .evaluate("window.clicked")
        .await
        .unwrap();
    assert_eq!(clicked, "Next;");
    assert_eq!(
        agent.get_value(r#"[id="usernameEntry"]"#).await.value.as_deref(),
        Some("alice")
    );

    agent.into_document().close().await.expect("Failed to close browser");
}
