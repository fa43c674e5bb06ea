fn main() {
    // ESP-IDF environment is only needed for `*-espidf` targets (Xtensa or RISC-V).
    // Build scripts run on the host, so check the TARGET env var.
    match std::env::var("TARGET") {
        Ok(target) if target.ends_with("-espidf") => embuild::espidf::sysenv::output(),
        _ => {}
    }
}
