fn main() {
    std::process::exit(udb_lib::run())
}
