fn main() {
    // Host builds (tests, tooling) skip the ESP-IDF link environment.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
