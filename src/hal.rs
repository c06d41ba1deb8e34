//! Hardware seams of the controller: analog sensors, buttons, tri-color
//! indicators and the console sink.
use std::fmt;

/// Single-channel ADC
pub trait AnalogInput: Send {
    /// Full-scale value of a conversion
    fn max_raw(&self) -> u32;
    /// Performs a single blocking conversion, the result is in `0..=max_raw()`
    fn read_channel(&mut self) -> u32;
}

/// Momentary push button
pub trait Button: Send {
    fn is_pressed(&self) -> bool;
}

/// Tri-color indicator. Every call sets all channels
pub trait Indicator: Send {
    fn set_color(&mut self, color: Rgb);
}

/// Text sink for reports. Implementations serialize concurrent writers
pub trait Console: Send + Sync {
    fn write_line(&self, line: &str);
    /// Writes the lines without interleaving them with other writers
    fn write_block(&self, lines: &[String]) {
        for line in lines {
            self.write_line(line);
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Hash)]
pub struct Rgb {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl Rgb {
    pub const NONE: Rgb = Rgb::new(false, false, false);
    pub const RED: Rgb = Rgb::new(true, false, false);
    pub const GREEN: Rgb = Rgb::new(false, true, false);
    pub const BLUE: Rgb = Rgb::new(false, false, true);
    pub const CYAN: Rgb = Rgb::new(false, true, true);
    pub const MAGENTA: Rgb = Rgb::new(true, false, true);
    pub const YELLOW: Rgb = Rgb::new(true, true, false);
    pub const WHITE: Rgb = Rgb::new(true, true, true);

    #[inline]
    pub const fn new(red: bool, green: bool, blue: bool) -> Self {
        Self { red, green, blue }
    }

    #[inline]
    pub fn is_dark(self) -> bool {
        self == Self::NONE
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dark() {
            return write!(f, "none");
        }
        let mut first = true;
        for (on, name) in [(self.red, "red"), (self.green, "green"), (self.blue, "blue")] {
            if on {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Button which reads pressed when any of its switches is pressed
pub struct AnyPressed<A, B>(pub A, pub B);

impl<A: Button, B: Button> Button for AnyPressed<A, B> {
    #[inline]
    fn is_pressed(&self) -> bool {
        self.0.is_pressed() || self.1.is_pressed()
    }
}

impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    #[inline]
    fn max_raw(&self) -> u32 {
        (**self).max_raw()
    }
    #[inline]
    fn read_channel(&mut self) -> u32 {
        (**self).read_channel()
    }
}

impl<T: Button + ?Sized> Button for Box<T> {
    #[inline]
    fn is_pressed(&self) -> bool {
        (**self).is_pressed()
    }
}

impl<T: Indicator + ?Sized> Indicator for Box<T> {
    #[inline]
    fn set_color(&mut self, color: Rgb) {
        (**self).set_color(color);
    }
}
