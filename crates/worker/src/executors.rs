use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use dcron_core::{
    config::ExecutorConfig,
    models::{ExecutionFailure, ExecutionInfo, ExecutionResult},
    traits::JobExecutor,
};

/// Shell任务执行器
///
/// 以 `shell -c command` 启动任务，子进程独占一个进程组，stdout和stderr合并收集。
/// 强杀时向整个进程组发送SIGKILL，命令派生的子进程一起结束。
pub struct ShellExecutor {
    shell: String,
    kill_grace: Duration,
}

impl ShellExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            kill_grace: config.kill_grace(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(&ExecutorConfig::default())
    }
}

#[async_trait]
impl JobExecutor for ShellExecutor {
    async fn execute(&self, info: &ExecutionInfo) -> ExecutionResult {
        let start_time = Utc::now();

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&info.job.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("启动Shell命令失败: job={}, error={}", info.job_name(), e);
                return ExecutionResult {
                    execution_info: info.clone(),
                    output: Vec::new(),
                    error: Some(ExecutionFailure::Spawn(e.to_string())),
                    start_time,
                    end_time: Utc::now(),
                };
            }
        };
        let pid = child.id();
        debug!("Shell任务已启动: job={}, pid={:?}", info.job_name(), pid);

        let output = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, Arc::clone(&output)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, Arc::clone(&output)));
        }

        let finished = {
            let wait = child.wait();
            tokio::pin!(wait);
            tokio::select! {
                status = &mut wait => Some(status),
                _ = info.cancel_token.cancelled() => None,
            }
        };

        let (status, cancelled) = match finished {
            Some(status) => (status, false),
            None => {
                info!("强杀Shell任务: job={}, pid={:?}", info.job_name(), pid);
                kill_process_group(&mut child, pid);
                (child.wait().await, true)
            }
        };

        // 孙进程可能继承了管道，强杀后最多等待kill_grace
        let grace = cancelled.then_some(self.kill_grace);
        for reader in readers {
            join_reader(info.job_name(), reader, grace).await;
        }
        let end_time = Utc::now();

        let error = if cancelled {
            Some(ExecutionFailure::Cancelled)
        } else {
            match status {
                Ok(status) if status.success() => None,
                Ok(status) => Some(match status.code() {
                    Some(code) => ExecutionFailure::NonZeroExit(code),
                    None => ExecutionFailure::Signaled(exit_signal(&status)),
                }),
                Err(e) => Some(ExecutionFailure::Io(e.to_string())),
            }
        };

        let output = match output.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        ExecutionResult {
            execution_info: info.clone(),
            output,
            error,
            start_time,
            end_time,
        }
    }

    fn name(&self) -> &str {
        "shell"
    }
}

fn spawn_reader<R>(mut pipe: R, output: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut out) = output.lock() {
                        out.extend_from_slice(&buf[..n]);
                    }
                }
                Err(e) => {
                    debug!("读取任务输出结束: {}", e);
                    break;
                }
            }
        }
    })
}

/// 等待输出读取任务结束，`grace` 到期仍未结束就中止它，读取完整时返回true
pub(crate) async fn join_reader(
    job_name: &str,
    mut reader: JoinHandle<()>,
    grace: Option<Duration>,
) -> bool {
    let joined = match grace {
        Some(grace) => match tokio::time::timeout(grace, &mut reader).await {
            Ok(joined) => joined,
            Err(_) => {
                debug!("任务输出在 {:?} 内没有读完，放弃剩余输出: job={}", grace, job_name);
                reader.abort();
                return false;
            }
        },
        None => reader.await,
    };
    match joined {
        Ok(()) => true,
        Err(e) => {
            warn!("任务输出读取异常退出: job={}, error={}", job_name, e);
            false
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut tokio::process::Child, pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            Ok(()) => return,
            Err(e) => warn!("向进程组 {} 发送SIGKILL失败: {}", pid, e),
        }
    }
    if let Err(e) = child.start_kill() {
        warn!("终止子进程失败: {}", e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut tokio::process::Child, _pid: Option<u32>) {
    if let Err(e) = child.start_kill() {
        warn!("终止子进程失败: {}", e);
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
