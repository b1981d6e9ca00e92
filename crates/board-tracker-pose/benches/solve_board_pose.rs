use board_tracker_aruco::{builtins::DICT_4X4_100, DetectedMarkers, GridBoard, GridBoardSpec, Marker};
use board_tracker_core::CameraIntrinsics;
use board_tracker_pose::{AxisAngle, BoardPoseSolver, SolverParams};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nalgebra::{Point2, Vector3};

fn synthetic(rows: u32, cols: u32) -> (GridBoard, CameraIntrinsics, DetectedMarkers) {
    let board = GridBoard::new(GridBoardSpec {
        rows,
        cols,
        marker_length: 0.03,
        marker_separation: 0.006,
        dictionary: DICT_4X4_100,
        first_marker: 0,
    })
    .expect("board");
    let camera = CameraIntrinsics::from_parts(
        [[900.0, 0.0, 640.0], [0.0, 900.0, 360.0], [0.0, 0.0, 1.0]],
        &[-0.1, 0.02, 0.0, 0.0, 0.0],
    )
    .expect("camera");

    let r = AxisAngle::new(2.9, 0.2, -0.15).to_rotation_matrix();
    let (w, h) = board.size();
    let t = Vector3::new(-w / 2.0, h / 2.0, 0.7);
    let markers = board
        .marker_ids()
        .map(|id| Marker {
            id,
            corners: board.marker_object_points(id).expect("on board").map(|p| {
                let px: Point2<f64> = camera.project(&(r * p.coords + t)).expect("visible");
                px.cast::<f32>()
            }),
            hamming: 0,
            score: 1.0,
        })
        .collect();
    (
        board,
        camera,
        DetectedMarkers {
            markers,
            rejected: Vec::new(),
        },
    )
}

fn bench_solve(c: &mut Criterion) {
    let solver = BoardPoseSolver::new(SolverParams::default());
    let mut group = c.benchmark_group("solve_board_pose");
    for (rows, cols) in [(1, 1), (2, 2), (5, 7)] {
        let (board, camera, detected) = synthetic(rows, cols);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rows}x{cols}")),
            &detected,
            |b, detected| {
                b.iter(|| solver.solve(black_box(detected), &board, &camera));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_solve);
criterion_main!(benches);
