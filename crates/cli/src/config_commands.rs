use {
    anyhow::Result,
    clap::Subcommand,
    secrecy::Secret,
    wicket_config::{WicketConfig, discover_and_load, find_or_default_config_path},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the path of the config file in use.
    Path,
    /// Print the effective configuration as TOML.
    Show,
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", find_or_default_config_path().display());
            Ok(())
        },
        ConfigAction::Show => {
            print!("{}", render(&discover_and_load())?);
            Ok(())
        },
    }
}

/// TOML rendering with the server password masked.
fn render(config: &WicketConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.password.is_some() {
        shown.password = Some(Secret::new("********".into()));
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_masks_password() {
        let config = WicketConfig {
            password: Some(Secret::new("hunter2".into())),
            ..Default::default()
        };
        let text = render(&config).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("password = \"********\""));
        assert!(text.contains("server = \"irc.libera.chat\""));
    }
}
