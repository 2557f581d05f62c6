use crate::process::{run_echoed, run_streaming};
use anyhow::{bail, Result};
use clap::{Args, Subcommand};

/// Images the docker-gated tests run
const TEST_IMAGES: &[&str] = &["alpine:3.19"];

#[derive(Args)]
pub struct DockerArgs {
    #[command(subcommand)]
    cmd: DockerCommand,
}

#[derive(Subcommand)]
pub enum DockerCommand {
    /// Pull the images used by the docker tests
    PullTestImages,
    /// Remove the images used by the docker tests
    CleanTestImages,
}

pub async fn run(args: DockerArgs) -> Result<()> {
    match args.cmd {
        DockerCommand::PullTestImages => pull_test_images().await,
        DockerCommand::CleanTestImages => clean_test_images().await,
    }
}

pub async fn ensure_test_images() -> Result<()> {
    println!("Checking Docker test images...");

    for &image in TEST_IMAGES {
        print!("  Checking for {}... ", image);
        if docker_image_exists(image).await? {
            println!("found");
        } else {
            println!("not found");
            pull_image(image).await?;
        }
    }

    println!("Test images ready\n");
    Ok(())
}

async fn pull_test_images() -> Result<()> {
    for &image in TEST_IMAGES {
        pull_image(image).await?;
    }
    Ok(())
}

async fn clean_test_images() -> Result<()> {
    println!("Cleaning test container images...\n");

    for &image in TEST_IMAGES {
        println!("Removing {}...", image);
        if !run_echoed("docker", &["rmi", image]).await? {
            eprintln!("Warning: Failed to remove image {}", image);
        }
    }

    println!("Test images cleaned");
    Ok(())
}

async fn docker_image_exists(image: &str) -> Result<bool> {
    let mut has_output = false;
    let status = run_streaming("docker", &["images", "-q", image], |line| {
        if !line.trim().is_empty() {
            has_output = true;
        }
    })
    .await?;
    Ok(status.success() && has_output)
}

async fn pull_image(image: &str) -> Result<()> {
    println!("  Pulling {}", image);
    if !run_echoed("docker", &["pull", image]).await? {
        bail!("Failed to pull Docker image {}", image);
    }
    Ok(())
}
