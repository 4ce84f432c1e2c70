fn main() {
    let mut args = std::env::args().skip(1);
    if let Some(command) = args.next() {
        if command == "action" {
            let Some(action) = args.next() else {
                eprintln!("Usage: text-shot action <capture|settings|quit>");
                std::process::exit(2);
            };

            match text_shot_lib::send_action_to_running_instance(&action) {
                Ok(()) => return,
                Err(_) => {
                    std::env::set_var(text_shot_lib::agent::START_ACTION_ENV, action);
                }
            }
        }
    }

    text_shot_lib::run()
}
