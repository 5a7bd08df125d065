fn main() {
    tracker_dashboard_lib::run()
}
