use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// バックグラウンドタスクの所有ハンドル。
///
/// `stop` は実行中の処理を終えてから停止させる。ハンドルを drop した場合は即座に abort する。
pub struct TaskHandle {
    name: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub(crate) fn new(
        name: &'static str,
        stop_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    tracing::warn!(task = self.name, error = %err, "background task ended abnormally");
                }
            }
        }
        tracing::debug!(task = self.name, "background task stopped");
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_signals_the_task() {
        let (stop_tx, stop_rx) = oneshot::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            flag.store(true, Ordering::SeqCst);
        });

        let handle = TaskHandle::new("test", stop_tx, task);
        handle.stop().await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_aborts_the_task() {
        let (stop_tx, _stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let abort = task.abort_handle();

        drop(TaskHandle::new("test", stop_tx, task));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(abort.is_finished());
    }
}
