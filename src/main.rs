fn main() {
    if let Err(err) = template_check::cli::run() {
        template_check::ui::eprintln_error(&err);
        std::process::exit(template_check::exit::exit_code(&err));
    }
}
