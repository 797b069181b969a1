//! Composite Rigid Body Algorithm (CRBA) -- mass matrix computation.

use kinet_math::{DMat, DVec, Mat6, SpatialTransform, SpatialVec, Vec6};
use kinet_model::Model;

/// Compute the joint-space mass matrix M(q) using CRBA.
///
/// Returns an nv x nv symmetric positive-definite matrix.
pub fn crba(model: &Model, q: &DVec) -> DMat {
    let nb = model.nbodies();
    let mut mass_matrix = DMat::zeros(model.nv, model.nv);

    // Tree transforms
    let mut x_tree = vec![SpatialTransform::identity(); nb];
    #[allow(clippy::needless_range_loop)]
    for i in 0..nb {
        let body = &model.bodies[i];
        let joint = &model.joints[body.joint_idx];
        let q_idx = model.q_offsets[body.joint_idx];
        let x_joint = joint.joint_transform(&q.as_slice()[q_idx..q_idx + joint.nq()]);
        x_tree[i] = x_joint.compose(&joint.parent_to_joint);
    }

    // Composite inertias (initialized from body inertias)
    let mut i_c: Vec<Mat6> = model.bodies.iter().map(|b| b.inertia.to_mat6()).collect();

    // Backward pass: accumulate composite inertias
    for i in (0..nb).rev() {
        let body = &model.bodies[i];
        if body.parent >= 0 {
            let pi = body.parent as usize;
            let x_mot = x_tree[i].motion_matrix();
            let lifted = x_mot.transpose() * i_c[i] * x_mot;
            i_c[pi] += lifted;
        }
    }

    // Mass matrix entries
    for i in 0..nb {
        let joint_i = &model.joints[model.bodies[i].joint_idx];
        let v_i = model.v_offsets[model.bodies[i].joint_idx];
        let ndof_i = joint_i.nv();

        if ndof_i == 0 {
            continue;
        }

        if ndof_i == 1 {
            let s_i = joint_i.motion_subspace();
            let f_i = SpatialVec::from_vec6(&(i_c[i] * s_i.to_vec6()));
            mass_matrix[(v_i, v_i)] = s_i.dot(&f_i);

            // Off-diagonal: walk up the tree
            let mut f = x_tree[i].inv_apply_force(&f_i);
            let mut j = model.bodies[i].parent;
            while j >= 0 {
                let ju = j as usize;
                let joint_j = &model.joints[model.bodies[ju].joint_idx];
                let v_j = model.v_offsets[model.bodies[ju].joint_idx];
                let ndof_j = joint_j.nv();

                if ndof_j == 1 {
                    let s_j = joint_j.motion_subspace();
                    mass_matrix[(v_i, v_j)] = s_j.dot(&f);
                    mass_matrix[(v_j, v_i)] = mass_matrix[(v_i, v_j)];
                } else if ndof_j > 1 {
                    let s_j = joint_j.motion_subspace_matrix();
                    let block = s_j.transpose() * DVec::from_column_slice(f.to_vec6().as_slice());
                    for kj in 0..ndof_j {
                        mass_matrix[(v_i, v_j + kj)] = block[kj];
                        mass_matrix[(v_j + kj, v_i)] = block[kj];
                    }
                }

                f = x_tree[ju].inv_apply_force(&f);
                j = model.bodies[ju].parent;
            }
        } else {
            // Multi-DOF joint
            let s_i = joint_i.motion_subspace_matrix(); // 6 x ndof_i
            let ic_dyn = DMat::from_column_slice(6, 6, i_c[i].as_slice());

            // F_i = I_c * S_i  (6 x ndof_i)
            let f_i_mat = &ic_dyn * &s_i;

            // Diagonal block: S_i^T * I_c * S_i
            let diag = s_i.transpose() * &f_i_mat;
            for ki in 0..ndof_i {
                for kj in 0..ndof_i {
                    mass_matrix[(v_i + ki, v_i + kj)] = diag[(ki, kj)];
                }
            }

            // Off-diagonal: walk up tree, one column at a time
            for col in 0..ndof_i {
                let f_col =
                    SpatialVec::from_vec6(&Vec6::from_iterator(f_i_mat.column(col).iter().cloned()));
                let mut f = x_tree[i].inv_apply_force(&f_col);
                let mut j = model.bodies[i].parent;
                while j >= 0 {
                    let ju = j as usize;
                    let joint_j = &model.joints[model.bodies[ju].joint_idx];
                    let v_j = model.v_offsets[model.bodies[ju].joint_idx];
                    let ndof_j = joint_j.nv();

                    if ndof_j == 1 {
                        let s_j = joint_j.motion_subspace();
                        let val = s_j.dot(&f);
                        mass_matrix[(v_i + col, v_j)] = val;
                        mass_matrix[(v_j, v_i + col)] = val;
                    } else if ndof_j > 1 {
                        let s_j = joint_j.motion_subspace_matrix();
                        let block =
                            s_j.transpose() * DVec::from_column_slice(f.to_vec6().as_slice());
                        for kj in 0..ndof_j {
                            mass_matrix[(v_i + col, v_j + kj)] = block[kj];
                            mass_matrix[(v_j + kj, v_i + col)] = block[kj];
                        }
                    }

                    f = x_tree[ju].inv_apply_force(&f);
                    j = model.bodies[ju].parent;
                }
            }
        }
    }

    mass_matrix
}
