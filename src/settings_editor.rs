//! The detached settings editor (`text-shot-settings --settings-file <ABS PATH>`).
//!
//! A line-command front end over [`SettingsStore`]: every edit is a load-mutate-save through
//! [`SettingsStore::update`], so the agent's watcher sees ordinary atomic writes. SIGUSR1 from
//! the agent brings the editor forward by printing the current settings again.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use crate::config::{Settings, SettingsStore};
use crate::hotkeys::{
    GlobalHotkeyRegistrar, HotkeyError, ShortcutAvailability, ShortcutDescriptor,
    TrialRegistration, UncheckedAvailability,
};

const EXIT_USAGE: u8 = 2;

const HELP: &str = "\
Commands:
  show                      print the current settings
  set hotkey <shortcut>     e.g. set hotkey CommandOrControl+Shift+2
  set showConfirmation <on|off>
  set launchAtLogin <on|off>
  set autoPaste <on|off>
  set debugMode <on|off>
  reset-hotkey              restore the default shortcut
  quit";

#[derive(Debug, Parser)]
#[command(name = "text-shot-settings", about = "Edit Text Shot settings", version)]
pub struct EditorArgs {
    /// Absolute path of the settings file the agent reads.
    #[arg(long, value_name = "PATH")]
    pub settings_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    Hotkey,
    ShowConfirmation,
    LaunchAtLogin,
    AutoPaste,
    DebugMode,
}

impl SettingField {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "hotkey" | "shortcut" => Some(Self::Hotkey),
            "showconfirmation" => Some(Self::ShowConfirmation),
            "launchatlogin" => Some(Self::LaunchAtLogin),
            "autopaste" => Some(Self::AutoPaste),
            "debugmode" => Some(Self::DebugMode),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorCommand {
    Show,
    Set { field: SettingField, value: String },
    ResetHotkey,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<EditorCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map(|(verb, rest)| (verb, rest.trim()))
        .unwrap_or((line, ""));

    let command = match verb.to_ascii_lowercase().as_str() {
        "show" => EditorCommand::Show,
        "reset-hotkey" => EditorCommand::ResetHotkey,
        "help" | "?" => EditorCommand::Help,
        "quit" | "exit" => EditorCommand::Quit,
        "set" => {
            let (field, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: set <field> <value>".to_string())?;
            let field =
                SettingField::parse(field).ok_or_else(|| format!("unknown setting: {field}"))?;
            EditorCommand::Set {
                field,
                value: value.trim().to_string(),
            }
        }
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(Some(command))
}

fn parse_switch(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("expected on or off, got {raw}")),
    }
}

/// What the session should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Render(Settings),
    Help,
    Quit,
}

fn set_hotkey(
    store: &SettingsStore,
    availability: &mut dyn ShortcutAvailability,
    raw: &str,
) -> Result<Settings, String> {
    let shortcut = ShortcutDescriptor::parse(raw).map_err(|e| e.to_string())?;
    let current = store.load().hotkey;
    // The agent holds the current shortcut, so a trial registration of it would always fail.
    if shortcut != current {
        if let Err(e) = availability.check_available(&shortcut) {
            return Err(match e {
                HotkeyError::Registration { .. } => {
                    format!("{shortcut} is already in use; keeping {current}")
                }
                other => other.to_string(),
            });
        }
    }
    store
        .update(|s| s.hotkey = shortcut)
        .map_err(|e| e.to_string())
}

/// Runs one command against the store. Errors are meant to be shown inline; the session goes on.
pub fn execute(
    store: &SettingsStore,
    availability: &mut dyn ShortcutAvailability,
    command: EditorCommand,
) -> Result<Reply, String> {
    let settings = match command {
        EditorCommand::Show => store.load(),
        EditorCommand::Help => return Ok(Reply::Help),
        EditorCommand::Quit => return Ok(Reply::Quit),
        EditorCommand::ResetHotkey => store
            .update(|s| s.hotkey = ShortcutDescriptor::default())
            .map_err(|e| e.to_string())?,
        EditorCommand::Set { field, value } => {
            let result = match field {
                SettingField::Hotkey => {
                    return set_hotkey(store, availability, &value).map(Reply::Render);
                }
                SettingField::ShowConfirmation => {
                    let on = parse_switch(&value)?;
                    store.update(|s| s.show_confirmation = on)
                }
                SettingField::LaunchAtLogin => {
                    let on = parse_switch(&value)?;
                    store.update(|s| s.launch_at_login = on)
                }
                SettingField::AutoPaste => {
                    let on = parse_switch(&value)?;
                    store.update(|s| s.auto_paste = on)
                }
                SettingField::DebugMode => {
                    let on = parse_switch(&value)?;
                    store.update(|s| s.debug_mode = on)
                }
            };
            result.map_err(|e| e.to_string())?
        }
    };
    Ok(Reply::Render(settings))
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub fn render(settings: &Settings) -> String {
    format!(
        "Text Shot settings\n  hotkey            {}\n  showConfirmation  {}\n  launchAtLogin     {}\n  autoPaste         {}\n  debugMode         {}",
        settings.hotkey,
        on_off(settings.show_confirmation),
        on_off(settings.launch_at_login),
        on_off(settings.auto_paste),
        on_off(settings.debug_mode),
    )
}

pub fn validate_settings_path(path: &Path) -> Result<(), String> {
    if !path.is_absolute() {
        return Err(format!(
            "--settings-file must be an absolute path, got {}",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(unix)]
struct RefocusSignal(tokio::signal::unix::Signal);

#[cfg(unix)]
impl RefocusSignal {
    fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::user_defined1())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct RefocusSignal;

#[cfg(not(unix))]
impl RefocusSignal {
    fn install() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

async fn session(
    store: SettingsStore,
    mut availability: Box<dyn ShortcutAvailability>,
) -> io::Result<()> {
    let mut refocus = RefocusSignal::install()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{}", render(&store.load()));
    println!("Type `help` for commands.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    return Ok(());
                };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(message) => {
                        println!("error: {message}");
                        continue;
                    }
                };
                match execute(&store, availability.as_mut(), command) {
                    Ok(Reply::Render(settings)) => println!("{}", render(&settings)),
                    Ok(Reply::Help) => println!("{HELP}"),
                    Ok(Reply::Quit) => return Ok(()),
                    Err(message) => println!("error: {message}"),
                }
            }
            _ = refocus.recv() => {
                debug!("Refocus requested");
                println!("{}", render(&store.load()));
            }
        }
    }
}

/// Entry point of the `text-shot-settings` binary.
pub fn main() -> ExitCode {
    let args = EditorArgs::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(message) = validate_settings_path(&args.settings_file) {
        eprintln!("{message}");
        return ExitCode::from(EXIT_USAGE);
    }

    // Created on the main thread, where the shortcut service must live.
    let availability: Box<dyn ShortcutAvailability> = match GlobalHotkeyRegistrar::new() {
        Ok(registrar) => Box::new(TrialRegistration::new(registrar)),
        Err(e) => {
            debug!(error = %e, "Shortcut conflicts will not be checked");
            Box::new(UncheckedAvailability)
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(session(SettingsStore::new(args.settings_file), availability)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Settings editor failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::tests::FakeRegistrar;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings-v2.json"));
        (dir, store)
    }

    fn run(store: &SettingsStore, line: &str) -> Result<Reply, String> {
        run_with(store, &mut UncheckedAvailability, line)
    }

    fn run_with(
        store: &SettingsStore,
        availability: &mut dyn ShortcutAvailability,
        line: &str,
    ) -> Result<Reply, String> {
        let command = parse_command(line)?.expect("non-empty command");
        execute(store, availability, command)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("SHOW"), Ok(Some(EditorCommand::Show)));
        assert_eq!(
            parse_command("set auto-paste  on"),
            Ok(Some(EditorCommand::Set {
                field: SettingField::AutoPaste,
                value: "on".to_string()
            }))
        );
        assert!(parse_command("set autoPaste").is_err());
        assert!(parse_command("set colour red").is_err());
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_set_switches_persist() {
        let (_dir, store) = store();

        let reply = run(&store, "set autoPaste on").unwrap();
        run(&store, "set showConfirmation off").unwrap();

        let saved = store.load();
        assert!(saved.auto_paste);
        assert!(!saved.show_confirmation);
        let Reply::Render(rendered) = reply else {
            panic!("expected settings");
        };
        assert!(rendered.auto_paste);
    }

    #[test]
    fn test_invalid_values_leave_file_untouched() {
        let (_dir, store) = store();

        let err = run(&store, "set hotkey Q").unwrap_err();
        assert!(err.contains("Invalid shortcut"), "{err}");
        assert!(run(&store, "set debugMode maybe").is_err());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_hotkey_set_and_reset() {
        let (_dir, store) = store();

        run(&store, "set hotkey ctrl+alt+t").unwrap();
        assert_eq!(store.load().hotkey.accelerator(), "Control+Alt+T");

        run(&store, "reset-hotkey").unwrap();
        assert_eq!(store.load().hotkey, ShortcutDescriptor::default());
    }

    #[test]
    fn test_conflicting_hotkey_is_reported_and_not_saved() {
        let (_dir, store) = store();
        let fake = FakeRegistrar::taking(&["Alt+B"]);
        let mut availability = TrialRegistration::new(fake.clone());

        let err = run_with(&store, &mut availability, "set hotkey alt+b").unwrap_err();
        assert!(err.contains("Alt+B is already in use"), "{err}");
        assert!(!store.path().exists());

        run_with(&store, &mut availability, "set hotkey alt+c").unwrap();
        assert_eq!(store.load().hotkey.accelerator(), "Alt+C");
        assert!(fake.registered().is_empty());
    }

    #[test]
    fn test_current_hotkey_is_not_rechecked() {
        let (_dir, store) = store();
        run(&store, "set hotkey alt+b").unwrap();
        // The running agent owns its own shortcut.
        let mut availability = TrialRegistration::new(FakeRegistrar::taking(&["Alt+B"]));

        let reply = run_with(&store, &mut availability, "set hotkey Alt+B").unwrap();
        let Reply::Render(rendered) = reply else {
            panic!("expected settings");
        };
        assert_eq!(rendered.hotkey.accelerator(), "Alt+B");
    }

    #[test]
    fn test_render_lists_every_field() {
        let text = render(&Settings::default());
        assert!(text.contains("CommandOrControl+Shift+2"));
        assert!(text.contains("showConfirmation  on"));
        assert!(text.contains("debugMode         off"));
    }

    #[test]
    fn test_settings_path_must_be_absolute() {
        assert!(validate_settings_path(Path::new("settings-v2.json")).is_err());
        assert!(validate_settings_path(&std::env::temp_dir().join("settings-v2.json")).is_ok());
    }

    #[test]
    fn test_missing_flag_is_a_usage_error() {
        let err = EditorArgs::try_parse_from(["text-shot-settings"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
