fn main() {
    // The ESP-IDF environment is only needed when cross-compiling for the Xtensa
    // targets; host builds (simulator, tests) skip it.
    if let Ok(target) = std::env::var("TARGET") {
        if target.contains("xtensa") || target.contains("espidf") {
            embuild::espidf::sysenv::output();
        }
    }
}
