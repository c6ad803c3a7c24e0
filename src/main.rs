fn main() {
    iconguard_lib::run()
}
