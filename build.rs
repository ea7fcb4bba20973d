fn main() {
    // Only run ESP-IDF build system when targeting ESP32 (Xtensa or RISC-V espidf targets)
    // Build scripts run on the host, so we check the TARGET env var
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") || target.ends_with("espidf") {
            embuild::espidf::sysenv::output();
        }
    }
}
