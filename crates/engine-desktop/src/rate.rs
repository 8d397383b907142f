// Sample rate, playback speed and channel layout conversion

/// Streaming linear-interpolation converter.
///
/// Source frames are stepped through at `source_rate * speed / output_rate`,
/// so one converter handles both device resampling and playback speed. The
/// last frame of each chunk is carried over to keep interpolation continuous.
pub struct RateConverter {
    in_channels: usize,
    out_channels: usize,
    step: f64,
    /// Read position relative to `carry`
    pos: f64,
    carry: Option<Vec<f32>>,
    mapped: Vec<f32>,
}

impl RateConverter {
    pub fn new(
        source_rate: u32,
        source_channels: u16,
        output_rate: u32,
        output_channels: u16,
        speed: f32,
    ) -> Self {
        Self {
            in_channels: source_channels.max(1) as usize,
            out_channels: output_channels.max(1) as usize,
            step: source_rate as f64 * speed as f64 / output_rate.max(1) as f64,
            pos: 0.0,
            carry: None,
            mapped: Vec::new(),
        }
    }

    /// Source frames consumed per output frame
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Forget buffered state, e.g. after a seek
    pub fn reset(&mut self) {
        self.pos = 0.0;
        self.carry = None;
    }

    /// Convert one interleaved chunk, appending to `output`
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        map_channels(input, self.in_channels, self.out_channels, &mut self.mapped);

        let ch = self.out_channels;
        let offset = usize::from(self.carry.is_some());
        let total = self.mapped.len() / ch + offset;
        if total == 0 {
            return;
        }

        let carry = self.carry.take();
        let frames = Frames {
            carry: carry.as_deref(),
            mapped: &self.mapped,
            channels: ch,
        };

        output.reserve(((total as f64 / self.step) as usize + 1) * ch);
        while self.pos + 1.0 < total as f64 {
            let index = self.pos as usize;
            let frac = (self.pos - index as f64) as f32;
            let (a, b) = (frames.get(index), frames.get(index + 1));
            output.extend(a.iter().zip(b).map(|(x, y)| x + (y - x) * frac));
            self.pos += self.step;
        }

        self.pos -= (total - 1) as f64;
        let last = frames.get(total - 1).to_vec();
        self.carry = Some(last);
    }
}

/// Carried frame followed by the current chunk
struct Frames<'a> {
    carry: Option<&'a [f32]>,
    mapped: &'a [f32],
    channels: usize,
}

impl<'a> Frames<'a> {
    fn get(&self, index: usize) -> &'a [f32] {
        match (self.carry, index) {
            (Some(prev), 0) => prev,
            (Some(_), i) => self.chunk_frame(i - 1),
            (None, i) => self.chunk_frame(i),
        }
    }

    fn chunk_frame(&self, index: usize) -> &'a [f32] {
        let start = index * self.channels;
        &self.mapped[start..start + self.channels]
    }
}

/// Remap interleaved `input` from `from` to `to` channels into `output`
fn map_channels(input: &[f32], from: usize, to: usize, output: &mut Vec<f32>) {
    output.clear();
    if from == to {
        output.extend_from_slice(input);
        return;
    }

    for frame in input.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            output.extend((0..to).map(|c| frame[c % from]));
        }
    }
}
