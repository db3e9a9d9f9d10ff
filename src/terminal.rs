mod bullet_points;

pub use bullet_points::BulletPointPrinter;

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};

pub fn prompt(prompt: &str) -> Result<String> {
    Ok(Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?)
}

/// Like [`prompt`] but an empty answer becomes `None`.
pub fn prompt_optional(prompt: &str) -> Result<Option<String>> {
    let answer: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact()?;
    Ok(if answer.trim().is_empty() {
        None
    } else {
        Some(answer)
    })
}

pub fn prompt_password(prompt: &str) -> Result<String> {
    Ok(Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact()?)
}

pub fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
