fn main() -> std::process::ExitCode {
    text_shot_lib::settings_editor::main()
}
