//! Planar rigid-body geometry.
//!
//! [`Pose2d`] is a field-relative position and heading.  Poses compose and
//! invert like the rigid transforms they are, and they interpolate along a
//! constant-curvature arc ([`Pose2d::exp`] / [`Pose2d::log`]) instead of
//! blending x, y and heading independently.
//!
//! [`ChassisSpeeds`] carries a frame marker ([`RobotFrame`] or
//! [`FieldFrame`]) so a velocity is never reinterpreted between frames
//! without an explicit heading-based rotation.
//!
//! # Example
//!
//! ```rust
//! use fieldpose_types::geometry::{Pose2d, Twist2d};
//! use std::f64::consts::FRAC_PI_2;
//!
//! // Drive a quarter circle of radius 1 m.
//! let start = Pose2d::identity();
//! let end = start.exp(&Twist2d::new(FRAC_PI_2, 0.0, FRAC_PI_2));
//! assert!((end.x - 1.0).abs() < 1e-9);
//! assert!((end.y - 1.0).abs() < 1e-9);
//! ```

use std::f64::consts::PI;
use std::marker::PhantomData;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Below this magnitude the closed-form exp/log terms switch to their Taylor
/// expansions.
const SMALL_ANGLE: f64 = 1e-9;

/// Wrap `angle` (radians) into `[-π, π)`.
pub fn angle_modulus(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}

// ────────────────────────────────────────────────────────────────────────────
// Translation2d
// ────────────────────────────────────────────────────────────────────────────

/// A 2-D vector in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Translation2d {
    pub x: f64,
    pub y: f64,
}

impl Translation2d {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Euclidean distance from the origin.
    pub fn norm(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Rotate counter-clockwise by `angle` radians.
    pub fn rotate_by(&self, angle: f64) -> Translation2d {
        let (sin, cos) = angle.sin_cos();
        Translation2d::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Add for Translation2d {
    type Output = Translation2d;
    fn add(self, rhs: Self) -> Self::Output {
        Translation2d::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Translation2d {
    type Output = Translation2d;
    fn sub(self, rhs: Self) -> Self::Output {
        Translation2d::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Translation2d {
    type Output = Translation2d;
    fn neg(self) -> Self::Output {
        Translation2d::new(-self.x, -self.y)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Twist2d
// ────────────────────────────────────────────────────────────────────────────

/// A differential motion along a constant-curvature arc, expressed in the
/// frame of the pose it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2d {
    /// Forward displacement (metres).
    pub dx: f64,
    /// Leftward displacement (metres).
    pub dy: f64,
    /// Heading change (radians).
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }

    pub fn scaled(&self, factor: f64) -> Twist2d {
        Twist2d::new(self.dx * factor, self.dy * factor, self.dtheta * factor)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose2d
// ────────────────────────────────────────────────────────────────────────────

/// Field-relative robot pose.
///
/// `heading` is counter-clockwise from the field +X axis and is kept wrapped
/// to `[-π, π)` by every constructor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    /// X position (metres).
    pub x: f64,
    /// Y position (metres).
    pub y: f64,
    /// Heading (radians).
    pub heading: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading: angle_modulus(heading),
        }
    }

    /// The field origin facing +X.
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_translation(translation: Translation2d, heading: f64) -> Self {
        Self::new(translation.x, translation.y, heading)
    }

    pub fn translation(&self) -> Translation2d {
        Translation2d::new(self.x, self.y)
    }

    /// Compose two transforms: `self ⊕ other`.
    ///
    /// `other` is expressed in the frame of `self`.
    /// ```text
    /// C.x = A.x + B.x·cos(A.θ) − B.y·sin(A.θ)
    /// C.y = A.y + B.x·sin(A.θ) + B.y·cos(A.θ)
    /// C.θ = A.θ + B.θ
    /// ```
    pub fn compose(&self, other: &Pose2d) -> Pose2d {
        let offset = other.translation().rotate_by(self.heading);
        Pose2d::new(self.x + offset.x, self.y + offset.y, self.heading + other.heading)
    }

    /// The transform that undoes `self`.
    pub fn inverse(&self) -> Pose2d {
        let t = (-self.translation()).rotate_by(-self.heading);
        Pose2d::new(t.x, t.y, -self.heading)
    }

    /// Express `self` in the frame of `origin`: `origin⁻¹ ⊕ self`.
    pub fn relative_to(&self, origin: &Pose2d) -> Pose2d {
        origin.inverse().compose(self)
    }

    /// Apply a twist to this pose (exponential map).
    pub fn exp(&self, twist: &Twist2d) -> Pose2d {
        let Twist2d { dx, dy, dtheta } = *twist;
        let (sin, cos) = dtheta.sin_cos();
        let (s, c) = if dtheta.abs() < SMALL_ANGLE {
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (sin / dtheta, (1.0 - cos) / dtheta)
        };
        let delta = Pose2d::new(dx * s - dy * c, dx * c + dy * s, dtheta);
        self.compose(&delta)
    }

    /// The twist that carries `self` onto `end` (logarithmic map).
    pub fn log(&self, end: &Pose2d) -> Twist2d {
        let transform = end.relative_to(self);
        let dtheta = transform.heading;
        let half = 0.5 * dtheta;
        let cos_minus_one = dtheta.cos() - 1.0;
        let k = if cos_minus_one.abs() < SMALL_ANGLE {
            1.0 - dtheta * dtheta / 12.0
        } else {
            -(half * dtheta.sin()) / cos_minus_one
        };
        // Multiply the translation by the complex number (k − i·half).
        let tx = transform.x * k + transform.y * half;
        let ty = transform.y * k - transform.x * half;
        Twist2d::new(tx, ty, dtheta)
    }

    /// Screw-motion interpolation: `t = 0` yields `self`, `t = 1` yields
    /// `end`, values outside `[0, 1]` are clamped.
    pub fn interpolate(&self, end: &Pose2d, t: f64) -> Pose2d {
        if t <= 0.0 {
            *self
        } else if t >= 1.0 {
            *end
        } else {
            self.exp(&self.log(end).scaled(t))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pose3d
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D pose as solved by a camera (position in metres, Tait-Bryan angles
/// in radians).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose3d {
    pub fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }

    /// Project onto the floor plane, keeping yaw as the heading.
    pub fn to_pose2d(&self) -> Pose2d {
        Pose2d::new(self.x, self.y, self.yaw)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ChassisSpeeds
// ────────────────────────────────────────────────────────────────────────────

/// Marker: velocity components along the robot's own forward/left axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RobotFrame;

/// Marker: velocity components along the field's X/Y axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldFrame;

/// Planar chassis velocity tagged with the frame it is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ChassisSpeeds<F> {
    /// Velocity along the frame's X axis (m/s).
    pub vx: f64,
    /// Velocity along the frame's Y axis (m/s).
    pub vy: f64,
    /// Angular velocity (rad/s, counter-clockwise positive).
    pub omega: f64,
    #[serde(skip)]
    frame: PhantomData<F>,
}

impl<F> ChassisSpeeds<F> {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self {
            vx,
            vy,
            omega,
            frame: PhantomData,
        }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl ChassisSpeeds<RobotFrame> {
    /// Rotate into the field frame given the robot's field heading.
    pub fn to_field_relative(&self, heading: f64) -> ChassisSpeeds<FieldFrame> {
        let v = Translation2d::new(self.vx, self.vy).rotate_by(heading);
        ChassisSpeeds::new(v.x, v.y, self.omega)
    }

    /// Rotate field-relative speeds into the robot frame.
    pub fn from_field_relative(speeds: &ChassisSpeeds<FieldFrame>, heading: f64) -> Self {
        let v = Translation2d::new(speeds.vx, speeds.vy).rotate_by(-heading);
        Self::new(v.x, v.y, speeds.omega)
    }

    /// The displacement produced by holding these speeds for `dt` seconds,
    /// as a twist in the robot frame.
    pub fn to_twist(&self, dt: f64) -> Twist2d {
        Twist2d::new(self.vx * dt, self.vy * dt, self.omega * dt)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
