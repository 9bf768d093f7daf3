// SmartMark state managers
// Managers handle stateful operations: the view controller owns the session and bookmark snapshot.

pub mod view_controller;
