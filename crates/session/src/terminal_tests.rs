// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;

#[yare::parameterized(
    empty = { "", WarningChoice::Keep },
    keep = { "keep", WarningChoice::Keep },
    short = { "l", WarningChoice::Logout },
    word = { "logout", WarningChoice::Logout },
    shouting = { "  LOGOUT \n", WarningChoice::Logout },
    quit = { "q", WarningChoice::Logout },
)]
fn choice_parsing(line: &str, expected: WarningChoice) {
    assert_eq!(parse_choice(line), expected);
}

#[tokio::test]
async fn line_answers_open_prompt() -> anyhow::Result<()> {
    let notifier = Arc::new(TerminalNotifier::new());
    assert!(!notifier.answer("x"));

    let prompt = tokio::spawn({
        let notifier = Arc::clone(&notifier);
        async move { notifier.present(2).await }
    });
    while !notifier.is_prompting() {
        tokio::task::yield_now().await;
    }

    assert!(notifier.answer("logout"));
    assert_eq!(prompt.await?, WarningChoice::Logout);
    assert!(!notifier.is_prompting());
    Ok(())
}

#[test]
fn navigation_carries_query() {
    let nav = LogNavigator::new(Some("/home".to_owned()));
    assert_eq!(nav.current_location().as_deref(), Some("/home"));

    nav.go_to("/session-ended", &[("reason", "timeout")]);
    assert_eq!(nav.current_location().as_deref(), Some("/session-ended?reason=timeout"));
}
