fn main() {
    // ESP-IDF builds need the sysenv exported by embuild; host builds need nothing.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
