//! Full closed-form chain on a synthetic stereo rig: homographies -> Zhang
//! intrinsics -> planar poses -> relative pose -> rectification -> depth.

use nalgebra::{Rotation3, Translation3};
use stereocal_core::{BrownConrady5, CameraIntrinsics, ImageSize, Iso3, Pt2, Pt3, Real};
use stereocal_linear::{
    dlt_homography, estimate_intrinsics_from_homographies, estimate_planar_pose_from_h,
    estimate_relative_pose, essential_from_pose, fundamental_from_essential,
    point_from_disparity, stereo_rectify, RectifyCamera,
};

const FX: Real = 800.0;
const BASELINE: Real = 60.0;

fn intrinsics() -> CameraIntrinsics {
    CameraIntrinsics {
        fx: FX,
        fy: FX,
        cx: 320.0,
        cy: 240.0,
        skew: 0.0,
    }
}

/// Pose of camera 1 in camera 0's frame: `x_c1 = R x_c0 + T`.
fn rig_pose() -> Iso3 {
    let rot = Rotation3::from_euler_angles(0.008, -0.015, 0.004);
    Iso3::from_parts(Translation3::new(-BASELINE, 0.4, 0.8), rot.into())
}

fn board_points(cols: usize, rows: usize, square: Real) -> Vec<Pt2> {
    let mut pts = Vec::with_capacity(cols * rows);
    for j in 0..rows {
        for i in 0..cols {
            pts.push(Pt2::new(i as Real * square, j as Real * square));
        }
    }
    pts
}

fn board_poses() -> Vec<Iso3> {
    let specs: [((Real, Real, Real), (Real, Real, Real)); 8] = [
        ((0.15, 0.05, 0.02), (-90.0, -60.0, 520.0)),
        ((-0.10, 0.20, -0.05), (-40.0, -90.0, 600.0)),
        ((0.25, -0.15, 0.00), (-120.0, -40.0, 480.0)),
        ((0.00, 0.12, 0.20), (-70.0, -75.0, 640.0)),
        ((-0.18, -0.08, 0.10), (-30.0, -50.0, 560.0)),
        ((0.08, 0.25, -0.12), (-100.0, -80.0, 700.0)),
        ((0.20, 0.00, 0.15), (-60.0, -30.0, 500.0)),
        ((-0.05, -0.20, -0.08), (-85.0, -65.0, 580.0)),
    ];
    specs
        .iter()
        .map(|((rx, ry, rz), (tx, ty, tz))| {
            Iso3::from_parts(
                Translation3::new(*tx, *ty, *tz),
                Rotation3::from_euler_angles(*rx, *ry, *rz).into(),
            )
        })
        .collect()
}

fn project(k: &CameraIntrinsics, cam_from_board: &Iso3, board: &[Pt2]) -> Vec<Pt2> {
    board
        .iter()
        .map(|bp| {
            let p = cam_from_board.transform_point(&Pt3::new(bp.x, bp.y, 0.0));
            Pt2::new(k.fx * p.x / p.z + k.cx, k.fy * p.y / p.z + k.cy)
        })
        .collect()
}

struct SyntheticRig {
    board: Vec<Pt2>,
    views0: Vec<Vec<Pt2>>,
    views1: Vec<Vec<Pt2>>,
}

fn make_rig() -> SyntheticRig {
    let k = intrinsics();
    let rel = rig_pose();
    let board = board_points(9, 6, 25.0);

    let mut views0 = Vec::new();
    let mut views1 = Vec::new();
    for pose0 in board_poses() {
        let pose1 = rel * pose0;
        views0.push(project(&k, &pose0, &board));
        views1.push(project(&k, &pose1, &board));
    }

    SyntheticRig {
        board,
        views0,
        views1,
    }
}

fn solve_homographies(board: &[Pt2], views: &[Vec<Pt2>]) -> Vec<nalgebra::Matrix3<Real>> {
    views
        .iter()
        .map(|v| dlt_homography(board, v).expect("homography"))
        .collect()
}

#[test]
fn zhang_recovers_both_cameras() {
    let rig = make_rig();
    let k_gt = intrinsics();

    for views in [&rig.views0, &rig.views1] {
        let hs = solve_homographies(&rig.board, views);
        let k_est = estimate_intrinsics_from_homographies(&hs).expect("zhang");

        assert!((k_est.fx - k_gt.fx).abs() < 1e-3, "fx={}", k_est.fx);
        assert!((k_est.fy - k_gt.fy).abs() < 1e-3, "fy={}", k_est.fy);
        assert!((k_est.cx - k_gt.cx).abs() < 1e-3, "cx={}", k_est.cx);
        assert!((k_est.cy - k_gt.cy).abs() < 1e-3, "cy={}", k_est.cy);
    }
}

#[test]
fn relative_pose_matches_rig() {
    let rig = make_rig();
    let kmtx = intrinsics().k_matrix();
    let rel_gt = rig_pose();

    let hs0 = solve_homographies(&rig.board, &rig.views0);
    let hs1 = solve_homographies(&rig.board, &rig.views1);

    let poses0: Vec<Iso3> = hs0
        .iter()
        .map(|h| estimate_planar_pose_from_h(&kmtx, h).expect("pose"))
        .collect();
    let poses1: Vec<Iso3> = hs1
        .iter()
        .map(|h| estimate_planar_pose_from_h(&kmtx, h).expect("pose"))
        .collect();

    let rel = estimate_relative_pose(&poses0, &poses1).expect("relative pose");

    let dt = (rel.translation.vector - rel_gt.translation.vector).norm();
    assert!(dt < 0.01, "translation error {dt}");
    let angle = rel.rotation.angle_to(&rel_gt.rotation);
    assert!(angle < 1e-5, "rotation error {angle}");

    // epipolar residuals of the fundamental matrix on the raw pixel pairs
    let e = essential_from_pose(&rel);
    let f = fundamental_from_essential(&e, &kmtx, &kmtx).expect("fundamental");
    for (p0, p1) in rig.views0[0].iter().zip(rig.views1[0].iter()) {
        let x0 = nalgebra::Vector3::new(p0.x, p0.y, 1.0);
        let x1 = nalgebra::Vector3::new(p1.x, p1.y, 1.0);
        let residual = (x1.transpose() * f * x0)[0];
        assert!(residual.abs() < 1e-4, "epipolar residual {residual}");
    }
}

#[test]
fn rectified_depth_matches_geometry() {
    let rig = make_rig();
    let kmtx = intrinsics().k_matrix();
    let rel_gt = rig_pose();

    let hs0 = solve_homographies(&rig.board, &rig.views0);
    let hs1 = solve_homographies(&rig.board, &rig.views1);
    let poses0: Vec<Iso3> = hs0
        .iter()
        .map(|h| estimate_planar_pose_from_h(&kmtx, h).expect("pose"))
        .collect();
    let poses1: Vec<Iso3> = hs1
        .iter()
        .map(|h| estimate_planar_pose_from_h(&kmtx, h).expect("pose"))
        .collect();
    let rel = estimate_relative_pose(&poses0, &poses1).expect("relative pose");

    let cam = RectifyCamera {
        k: intrinsics(),
        dist: BrownConrady5::zero(),
        size: ImageSize::new(640, 480),
    };
    let rect = stereo_rectify(&cam, &cam, &rel).expect("rectify");

    // observe a physical point through both rectified views
    let p = Pt3::new(20.0, -15.0, 750.0);
    let p1 = rel_gt.transform_point(&p);

    let pr0 = rect.r0 * p.coords;
    let px0 = Pt2::new(
        rect.f * pr0.x / pr0.z + rect.p0[(0, 2)],
        rect.f * pr0.y / pr0.z + rect.p0[(1, 2)],
    );
    let pr1 = rect.r1 * p1.coords;
    let px1 = Pt2::new(
        rect.f * pr1.x / pr1.z + rect.p1[(0, 2)],
        rect.f * pr1.y / pr1.z + rect.p1[(1, 2)],
    );

    // rows align even though the pose came from the estimation chain
    assert!((px0.y - px1.y).abs() < 1e-3, "{} vs {}", px0.y, px1.y);

    let est = point_from_disparity(&rect.q, &px0, &px1).expect("depth");
    let expected_z = (rect.r0 * p.coords).z;
    assert!(
        (est.z - expected_z).abs() / expected_z < 1e-3,
        "z={} expected={expected_z}",
        est.z
    );
    assert!(est.z > 0.0);
}
