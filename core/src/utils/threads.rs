use std::thread;

/// Spawns a named OS thread. Named threads show up in panics, `top -H` and
/// debuggers, which matters once a handful of Updaters are running at once.
pub fn spawn_named_thread<F, T, S>(name: S, f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
    S: ToString,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("thread config should be valid")
}
