// THEORY:
// The `Pixel` module is the smallest unit of the motion pipeline. A `Pixel` is a
// "dumb" RGB sample that knows how to reduce itself to a single intensity and how to
// measure its absolute difference against another sample. Nothing here looks at
// neighbors or history; spatial grouping lives in the extractor and temporal state
// lives in the reference model.
//
// Intensity is Rec. 601 luma by default. A single channel can be requested instead,
// which is useful when the illumination makes one channel far cleaner than the
// others (e.g. red-light assays).

pub mod pixel {
    use serde::{Deserialize, Serialize};

    pub type Channel = u8;
    pub type Luminance = f64;

    pub const CHANNELS: usize = 3;

    /// How a color difference is collapsed into one intensity value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ChannelMode {
        #[default]
        Luma,
        Red,
        Green,
        Blue,
    }

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// Intensity under the requested channel mode.
        pub fn intensity(&self, mode: ChannelMode) -> Luminance {
            match mode {
                ChannelMode::Luma => self.luminance(),
                ChannelMode::Red => self.red as f64,
                ChannelMode::Green => self.green as f64,
                ChannelMode::Blue => self.blue as f64,
            }
        }

        /// Per-channel absolute difference. Always within 0..=255.
        pub fn abs_diff(&self, other: &Pixel) -> Pixel {
            Pixel {
                red: self.red.abs_diff(other.red),
                green: self.green.abs_diff(other.green),
                blue: self.blue.abs_diff(other.blue),
            }
        }
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            Pixel::new(rgb[0], rgb[1], rgb[2])
        }
    }

    impl From<Pixel> for image::Rgb<u8> {
        fn from(pixel: Pixel) -> Self {
            image::Rgb([pixel.red, pixel.green, pixel.blue])
        }
    }
}
