use stampede_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Share of the available CPU above which the load generator is likely skewing its own latencies.
const HIGH_CPU_USAGE_PERCENT: f32 = 80.0;

/// Monitor the resource usage of the Stampede process and report high usage.
///
/// Note that this won't stop the run proceeding, it will just log a warning to let the user know
/// that measured latencies might include time spent waiting for the load generator itself.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL] and
/// checked. A warning is logged each time usage rises above [HIGH_CPU_USAGE_PERCENT] of all cores.
pub(crate) fn start_monitor(shutdown_listener: DelegatedShutdownListener) {
    let spawned = std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            let mut was_high = false;
            loop {
                if shutdown_listener.should_shutdown() {
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::debug!("Resource monitor could not read process info, stopping");
                    break;
                };

                let usage = process.cpu_usage() / cpu_count as f32;
                let is_high = usage > HIGH_CPU_USAGE_PERCENT;
                if is_high && !was_high {
                    log::warn!(
                        "High CPU usage detected. Stampede is using {usage:.2}% of the CPU, with {cpu_count} available cores"
                    );
                }
                was_high = is_high;

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start resource monitor: {e:?}");
    }
}
