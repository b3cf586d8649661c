use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use bytesize::ByteSize;
use dataup::VideoId;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::client::VideoClient;
use crate::workload::{Action, Workload};

pub async fn perform_stresstest(
    remote: VideoClient,
    workloads: Vec<Workload>,
    duration: Duration,
) -> Result<()> {
    let remote = Arc::new(remote);
    let added_ids = Arc::new(Mutex::new(Vec::new()));

    // run the workloads concurrently
    let tasks: Vec<_> = workloads
        .into_iter()
        .map(|workload| {
            let remote = Arc::clone(&remote);
            let added_ids = Arc::clone(&added_ids);
            tokio::spawn(async move {
                let concurrency = workload.config.concurrency;
                let name = workload.config.name;
                let semaphore = Arc::new(Semaphore::new(concurrency));
                let deadline = tokio::time::Instant::now() + duration;

                let workload = Arc::new(Mutex::new(workload));

                let task_durations = Arc::new(Mutex::new(DDSketch::default()));
                let failures = Arc::new(AtomicUsize::new(0));

                // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
                let sleep = tokio::time::sleep_until(deadline);
                tokio::pin!(sleep);

                loop {
                    tokio::select! {
                        permit = semaphore.clone().acquire_owned() => {
                            let Ok(permit) = permit else { break };
                            let workload = Arc::clone(&workload);
                            let remote = Arc::clone(&remote);
                            let added_ids = Arc::clone(&added_ids);
                            let task_durations = Arc::clone(&task_durations);
                            let failures = Arc::clone(&failures);
                            let task_start = Instant::now();

                            let task = async move {
                                let action = lock(&workload).next_action();
                                let result = match action {
                                    Action::Add => remote
                                        .add_video(format!("{name} video"))
                                        .await
                                        .map(|id| {
                                            lock(&added_ids).push(id);
                                            lock(&workload).push_pending(id);
                                        }),
                                    Action::Upload(seed, id, payload) => remote
                                        .upload(id, payload)
                                        .await
                                        .map(|()| lock(&workload).push_uploaded(seed, id)),
                                    Action::Read(seed, id, payload) => remote
                                        .read(id, payload)
                                        .await
                                        .map(|()| lock(&workload).push_uploaded(seed, id)),
                                };

                                match result {
                                    Ok(()) => lock(&task_durations)
                                        .add(task_start.elapsed().as_secs_f64()),
                                    Err(err) => {
                                        if failures.fetch_add(1, Ordering::Relaxed) == 0 {
                                            println!("first failure: {err:#}");
                                        }
                                    }
                                }

                                drop(permit);
                            };
                            tokio::spawn(task);
                        }
                        _ = &mut sleep => {
                            break;
                        }
                    }
                }

                // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
                let _permits = semaphore.acquire_many(concurrency as u32).await;

                let task_durations = std::mem::take(&mut *lock(&task_durations));
                let config = lock(&workload).config;
                (config, task_durations, failures.load(Ordering::Relaxed))
            })
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;

    let mut total_failures = 0;
    for (i, task) in finished_tasks.into_iter().enumerate() {
        let (config, task_durations, failures) = task?;
        total_failures += failures;

        let concurrency = config.concurrency;
        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        println!("# Workload {i} `{}` (concurrency: {concurrency})", config.name);
        println!(
            "  payload sizes {}-{}",
            ByteSize::b(config.p50_size),
            ByteSize::b(config.p99_size)
        );
        println!("=> {ops} operations, {ops_ps:.2} ops/s, {failures} failures");

        if ops == 0 {
            continue;
        }
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
    }

    let added_ids = std::mem::take(&mut *lock(&added_ids));
    verify_registry(&remote, &added_ids).await?;

    ensure!(total_failures == 0, "{total_failures} operations failed");
    Ok(())
}

/// Checks that the server handed out every id exactly once.
async fn verify_registry(remote: &VideoClient, added_ids: &[VideoId]) -> Result<()> {
    let listed = remote.list_videos().await?;

    let mut listed_ids = BTreeSet::new();
    for video in &listed {
        ensure!(listed_ids.insert(video.id), "{:?} is listed twice", video.id);
    }

    let mut seen = BTreeSet::new();
    for id in added_ids {
        ensure!(seen.insert(*id), "{id:?} was handed out twice");
        ensure!(listed_ids.contains(id), "{id:?} is missing from the listing");
    }

    println!(
        "# Registry: {} videos listed, {} added by this run, no duplicate ids",
        listed.len(),
        added_ids.len()
    );
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
