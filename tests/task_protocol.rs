//! S1 — chained tasks: `compute()` returns 42, `add_one(x)` returns `x + 1`;
//! awaiting `add_one(await compute())` yields 43.
//!
//! S2 — failure propagation: awaiting a task whose body fails with message
//! "boom" must fail with a message containing "boom".

use std::sync::{Arc, Mutex};

use taskloop::error::{Error, ErrorKind};
use taskloop::{Runtime, Task};

fn compute() -> Task<i32> {
    Task::new(async { Ok(42) })
}

fn add_one(x: i32) -> Task<i32> {
    Task::new(async move { Ok(x + 1) })
}

#[test]
fn chained_tasks_yield_expected_value() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();

    let rt = Runtime::new();
    let result = Arc::new(Mutex::new(None));
    let result_clone = result.clone();
    let rt_clone = rt.clone();

    let driver: Task<()> = Task::new(async move {
        let chain = add_one(compute().await.unwrap()).await.unwrap();
        *result_clone.lock().unwrap() = Some(chain);
        rt_clone.stop();
        Ok(())
    });
    driver.start(&rt);
    rt.run();

    assert_eq!(*result.lock().unwrap(), Some(43));
}

#[test]
fn failure_propagates_through_await() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();

    let rt = Runtime::new();
    let observed = Arc::new(Mutex::new(None));
    let observed_clone = observed.clone();
    let rt_clone = rt.clone();

    let boom: Task<()> = Task::new(async { Err(Error::new(ErrorKind::InvalidArgument, "boom")) });

    let driver: Task<()> = Task::new(async move {
        *observed_clone.lock().unwrap() = Some(boom.await.unwrap_err());
        rt_clone.stop();
        Ok(())
    });
    driver.start(&rt);
    rt.run();

    let observed = observed.lock().unwrap();
    let err = observed.as_ref().unwrap();
    assert!(err.message().contains("boom"));
}
