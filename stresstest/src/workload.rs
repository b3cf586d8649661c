use std::io;
use std::thread::available_parallelism;

use dataup::VideoId;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::weighted::WeightedIndex;
use rand_distr::{Distribution, LogNormal, Zipf};

pub struct WorkloadBuilder {
    name: &'static str,
    concurrency: usize,
    seed: u64,

    p50_size: u64,
    p99_size: u64,

    add_weight: u8,
    upload_weight: u8,
    read_weight: u8,
}

impl WorkloadBuilder {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn size_distribution(mut self, p50: u64, p99: u64) -> Self {
        self.p50_size = p50;
        self.p99_size = p99;
        self
    }

    pub fn action_weights(mut self, adds: u8, uploads: u8, reads: u8) -> Self {
        self.add_weight = adds;
        self.upload_weight = uploads;
        self.read_weight = reads;
        self
    }

    pub fn build(self) -> anyhow::Result<Workload> {
        let rng = SmallRng::seed_from_u64(self.seed);

        // Inspired by <https://stats.stackexchange.com/a/649432>
        let p50 = self.p50_size as f64;
        let p99 = self.p99_size as f64;
        let mu = p50.ln();
        let sigma = (p99.ln() - mu) / 2.3263;

        let size_distribution = LogNormal::new(mu, sigma)?;
        let action_distribution =
            WeightedIndex::new([self.add_weight, self.upload_weight, self.read_weight])?;

        Ok(Workload {
            config: WorkloadConfig {
                name: self.name,
                concurrency: self.concurrency,
                p50_size: self.p50_size,
                p99_size: self.p99_size,
            },

            rng,
            size_distribution,
            action_distribution,

            pending_videos: Default::default(),
            uploaded_videos: Default::default(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkloadConfig {
    pub name: &'static str,
    pub concurrency: usize,
    pub p50_size: u64,
    pub p99_size: u64,
}

pub struct Workload {
    pub config: WorkloadConfig,

    /// The RNG driving all our distributions.
    rng: SmallRng,
    /// A distribution that generates payload sizes for the `upload` action.
    size_distribution: LogNormal<f64>,
    /// A distribution that generates actions, such as add/upload/read.
    action_distribution: WeightedIndex<u8>,

    /// Videos that were registered but have no data yet.
    pending_videos: Vec<VideoId>,
    /// Videos with uploaded data, and the seed their payload was generated from.
    uploaded_videos: Vec<(PayloadSeed, VideoId)>,
}

impl Workload {
    pub fn builder(name: &'static str) -> WorkloadBuilder {
        WorkloadBuilder {
            name,
            concurrency: available_parallelism().map(|n| n.get()).unwrap_or(4),
            seed: rand::random(),

            p50_size: 16 * 1024,
            p99_size: 1024 * 1024,

            add_weight: 33,
            upload_weight: 33,
            read_weight: 33,
        }
    }

    fn get_payload(&self, seed: PayloadSeed) -> Payload {
        let mut rng = SmallRng::seed_from_u64(seed.0);
        let len = self.size_distribution.sample(&mut rng) as u64;

        Payload { len, rng }
    }

    /// Picks an uploaded video, skewed towards recent uploads.
    fn sample_readback(&mut self) -> Option<(PayloadSeed, VideoId)> {
        if self.uploaded_videos.is_empty() {
            return None;
        }
        let len = self.uploaded_videos.len();
        let zipf = Zipf::new(len as f64, 2.0).ok()?;
        let idx = len - self.rng.sample(zipf) as usize;

        Some(self.uploaded_videos.remove(idx))
    }

    /// When the chosen action has nothing to work on, a new video is added instead.
    pub fn next_action(&mut self) -> Action {
        match self.action_distribution.sample(&mut self.rng) {
            1 => {
                let Some(id) = self.pending_videos.pop() else {
                    return Action::Add;
                };
                let seed = PayloadSeed(self.rng.next_u64());
                let payload = self.get_payload(seed);
                Action::Upload(seed, id, payload)
            }
            2 => {
                let Some((seed, id)) = self.sample_readback() else {
                    return Action::Add;
                };
                let payload = self.get_payload(seed);
                Action::Read(seed, id, payload)
            }
            _ => Action::Add,
        }
    }

    pub fn push_pending(&mut self, id: VideoId) {
        self.pending_videos.push(id)
    }

    /// Makes an uploaded video available for reads.
    ///
    /// This has to be called when an upload or a read has completed.
    /// (Videos currently being read will not be concurrently re-uploaded)
    pub fn push_uploaded(&mut self, seed: PayloadSeed, id: VideoId) {
        self.uploaded_videos.push((seed, id))
    }
}

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub struct PayloadSeed(u64);

pub enum Action {
    Add,
    Upload(PayloadSeed, VideoId, Payload),
    Read(PayloadSeed, VideoId, Payload),
}

pub struct Payload {
    pub len: u64,
    pub rng: SmallRng,
}

impl io::Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len_to_fill = (buf.len() as u64).min(self.len) as usize;

        let fill_buf = &mut buf[..len_to_fill];
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        Ok(len_to_fill)
    }
}
