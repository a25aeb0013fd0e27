use crate::domain::ports::BatchJob;
use crate::utils::error::Result;

pub struct BatchEngine<J: BatchJob> {
    job: J,
}

impl<J: BatchJob> BatchEngine<J> {
    pub fn new(job: J) -> Self {
        Self { job }
    }

    pub async fn run(&self) -> Result<String> {
        tracing::info!("Starting batch analysis...");

        let requests = self.job.extract().await?;
        tracing::info!("Read {} URL(s)", requests.len());

        let report = self.job.transform(requests).await?;
        tracing::info!(
            "Analyzed {} URL(s), {} failed",
            report.entries.len(),
            report.failures.len()
        );

        let output_path = self.job.load(report).await?;
        tracing::info!("Report saved to: {}", output_path);

        Ok(output_path)
    }
}
